//! Error types for configuration, the SPI bus and the pixel server.
//!
//! Frame-level problems are not errors here: they are reported as
//! `frame::FrameAnomaly`, logged, and the frame is still processed.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the values handed to the server at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Gamma exponents must be finite and strictly positive.
    #[error("invalid gamma value {0}: must be a finite number greater than 0")]
    InvalidGamma(f64),

    /// A gamma triple that is not three comma-separated numbers.
    #[error("wrong gamma format {0:?}: expected three comma-separated values \"R,G,B\"")]
    GammaFormat(String),

    #[error("invalid panel size {rows}x{cols}: a full frame must be 1 to 65507 bytes")]
    InvalidPanel { rows: u32, cols: u32 },

    #[error("invalid bus clock rate: must be greater than 0 Hz")]
    InvalidClockRate,
}

/// Failures of the synchronous serial bus.
#[derive(Error, Debug)]
pub enum BusError {
    /// The device could not be opened or configured.
    #[error("bus device {device} unavailable: {source}")]
    DeviceUnavailable {
        device: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single frame could not be shifted out. Recoverable.
    #[error("transmission failed: {0}")]
    TransmissionFailed(#[source] io::Error),

    #[error("failed to close bus device: {0}")]
    CloseFailed(#[source] io::Error),
}

/// Errors that stop the pixel server, either at startup or at runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The UDP listener could not be bound.
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Bus(#[from] BusError),

    /// The listener failed for a reason other than a deliberate close.
    #[error("network transport fault: {0}")]
    TransportFault(#[source] io::Error),

    /// `handle()` was called after the socket and bus were already consumed.
    #[error("pixel server has already been handled")]
    AlreadyHandled,

    #[error("receive loop panicked")]
    LoopPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_error_converts_into_server_error() {
        let err: ServerError = ConfigError::InvalidGamma(-1.0).into();
        assert!(matches!(err, ServerError::Config(ConfigError::InvalidGamma(_))));
        assert_eq!(
            err.to_string(),
            "invalid gamma value -1: must be a finite number greater than 0"
        );
    }

    #[test]
    fn device_unavailable_names_the_device() {
        let err = BusError::DeviceUnavailable {
            device: PathBuf::from("/dev/spidev0.0"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
        };
        assert_eq!(
            err.to_string(),
            "bus device /dev/spidev0.0 unavailable: no such device"
        );
    }
}
