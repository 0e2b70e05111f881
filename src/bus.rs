//! The synchronous serial bus the panel hangs off.
//!
//! Two implementations share the `Bus` trait:
//! - `SpiBus` (feature `hardware`): a Linux spidev device in mode 0, 8 bits
//!   per word, write-only
//! - `NullBus`: logs what it would have sent, for machines without a panel
//!
//! The server only ever sees a `Box<dyn Bus>`, so it runs unchanged in
//! development and on the target.

use crate::error::BusError;
use std::path::PathBuf;

/// Default spidev node on a Raspberry Pi.
pub const DEFAULT_DEVICE: &str = "/dev/spidev0.0";

/// Default SPI clock in Hz.
pub const DEFAULT_CLOCK_HZ: u32 = 2_000_000;

/// A write-only byte sink driving the panel.
pub trait Bus: Send {
    /// Shift `frame` out to the panel.
    fn write(&mut self, frame: &[u8]) -> Result<(), BusError>;

    /// Release the device. Later writes fail.
    fn close(&mut self) -> Result<(), BusError>;
}

/// Where and how fast to talk to the panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub device: PathBuf,
    pub clock_hz: u32,
    /// Use `NullBus` instead of opening `device`.
    pub simulate: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            clock_hz: DEFAULT_CLOCK_HZ,
            simulate: false,
        }
    }
}

/// Open the bus described by `config`.
pub fn open(config: &BusConfig) -> Result<Box<dyn Bus>, BusError> {
    if config.simulate {
        tracing::info!(
            "Simulating bus {} (no hardware attached)",
            config.device.display()
        );
        return Ok(Box::new(NullBus::new()));
    }
    open_device(config)
}

#[cfg(feature = "hardware")]
fn open_device(config: &BusConfig) -> Result<Box<dyn Bus>, BusError> {
    Ok(Box::new(SpiBus::open(&config.device, config.clock_hz)?))
}

#[cfg(not(feature = "hardware"))]
fn open_device(config: &BusConfig) -> Result<Box<dyn Bus>, BusError> {
    Err(BusError::DeviceUnavailable {
        device: config.device.clone(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "built without the 'hardware' feature",
        ),
    })
}

// ── SPI ──────────────────────────────────────────────────────────────

#[cfg(feature = "hardware")]
pub use spi::SpiBus;

#[cfg(feature = "hardware")]
mod spi {
    use super::Bus;
    use crate::error::BusError;
    use spidev::{SpiModeFlags, Spidev, SpidevOptions};
    use std::io::{self, Write};
    use std::path::{Path, PathBuf};

    /// A spidev device configured for the panel's driver chips.
    pub struct SpiBus {
        device: PathBuf,
        spi: Option<Spidev>,
    }

    impl SpiBus {
        pub fn open(device: &Path, clock_hz: u32) -> Result<Self, BusError> {
            let unavailable = |source| BusError::DeviceUnavailable {
                device: device.to_path_buf(),
                source,
            };

            let mut spi = Spidev::open(device).map_err(unavailable)?;
            let options = SpidevOptions::new()
                .bits_per_word(8)
                .max_speed_hz(clock_hz)
                .mode(SpiModeFlags::SPI_MODE_0)
                .build();
            spi.configure(&options).map_err(unavailable)?;

            tracing::info!(
                "Opened SPI device {} at {} Hz",
                device.display(),
                clock_hz
            );
            Ok(Self {
                device: device.to_path_buf(),
                spi: Some(spi),
            })
        }
    }

    impl Bus for SpiBus {
        fn write(&mut self, frame: &[u8]) -> Result<(), BusError> {
            let spi = self.spi.as_mut().ok_or_else(|| {
                BusError::TransmissionFailed(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "SPI device already closed",
                ))
            })?;
            spi.write_all(frame).map_err(BusError::TransmissionFailed)
        }

        fn close(&mut self) -> Result<(), BusError> {
            if let Some(mut spi) = self.spi.take() {
                spi.flush().map_err(BusError::CloseFailed)?;
                tracing::info!("Closed SPI device {}", self.device.display());
            }
            Ok(())
        }
    }
}

// ── Null bus ─────────────────────────────────────────────────────────

/// Stand-in for a missing panel. Every write succeeds.
#[derive(Debug, Default)]
pub struct NullBus {
    frames: u64,
}

impl NullBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bus for NullBus {
    fn write(&mut self, frame: &[u8]) -> Result<(), BusError> {
        self.frames += 1;
        tracing::debug!("Received {} bytes", frame.len());
        Ok(())
    }

    fn close(&mut self) -> Result<(), BusError> {
        tracing::info!("Null bus closed after {} frames", self.frames);
        Ok(())
    }
}
