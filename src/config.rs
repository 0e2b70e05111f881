//! Startup configuration handed to the pixel server by the CLI.

use crate::PanelConfig;
use crate::bus::BusConfig;
use crate::error::ConfigError;
use crate::gamma::{self, CHANNELS};
use std::time::Duration;

/// UDP port the daemon listens on by default.
pub const DEFAULT_PORT: u16 = 5333;

/// Default exponent for every channel.
pub const DEFAULT_GAMMA: f64 = 3.0;

/// Receive buffer capacity, enough for ~341 pixels. Larger panels get a
/// buffer that holds one full frame.
pub const BUFFER_SIZE: usize = 1024;

/// Largest payload a single UDP datagram over IPv4 can carry.
pub const MAX_FRAME_BYTES: usize = 65_507;

/// How long a blocked receive waits before re-checking for shutdown.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the server needs, fixed for its whole lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelServerConfig {
    /// UDP port, bound on all local addresses. 0 picks an ephemeral port.
    pub port: u16,
    pub bus: BusConfig,
    /// Initial `[red, green, blue]` exponents.
    pub gamma: [f64; CHANNELS],
    pub panel: PanelConfig,
    pub poll_interval: Duration,
}

impl Default for PixelServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bus: BusConfig::default(),
            gamma: [DEFAULT_GAMMA; CHANNELS],
            panel: PanelConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PixelServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for exponent in self.gamma {
            gamma::validate_exponent(exponent)?;
        }
        let frame_bytes = self.panel.checked_frame_byte_count().unwrap_or(usize::MAX);
        if frame_bytes == 0 || frame_bytes > MAX_FRAME_BYTES {
            return Err(ConfigError::InvalidPanel {
                rows: self.panel.rows,
                cols: self.panel.cols,
            });
        }
        if self.bus.clock_hz == 0 {
            return Err(ConfigError::InvalidClockRate);
        }
        Ok(())
    }
}

/// Parse a `"R,G,B"` triple of gamma exponents.
pub fn parse_gamma_triple(input: &str) -> Result<[f64; CHANNELS], ConfigError> {
    let format_error = || ConfigError::GammaFormat(input.to_string());

    let values = input
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|_| format_error()))
        .collect::<Result<Vec<_>, _>>()?;

    let triple: [f64; CHANNELS] = values.try_into().map_err(|_| format_error())?;
    for exponent in triple {
        gamma::validate_exponent(exponent)?;
    }
    Ok(triple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn defaults_match_deployment() {
        let config = PixelServerConfig::default();
        assert_eq!(config.port, 5333);
        assert_eq!(config.bus.clock_hz, 2_000_000);
        assert_eq!(config.gamma, [3.0, 3.0, 3.0]);
        assert_eq!(config.panel.frame_byte_count(), 300);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case("3.0,3.0,3.0", [3.0, 3.0, 3.0])]
    #[case("2.2,2.5,2.8", [2.2, 2.5, 2.8])]
    #[case(" 1 , 2 , 3 ", [1.0, 2.0, 3.0])]
    fn parses_gamma_triples(#[case] input: &str, #[case] expected: [f64; 3]) {
        assert_eq!(parse_gamma_triple(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("3.0")]
    #[case("3.0,3.0")]
    #[case("3.0,3.0,3.0,3.0")]
    #[case("3.0,x,3.0")]
    fn malformed_triples_are_rejected(#[case] input: &str) {
        assert_eq!(
            parse_gamma_triple(input),
            Err(ConfigError::GammaFormat(input.to_string()))
        );
    }

    #[test]
    fn non_positive_triple_value_is_invalid_gamma() {
        assert_eq!(
            parse_gamma_triple("3.0,0,3.0"),
            Err(ConfigError::InvalidGamma(0.0))
        );
    }

    #[test]
    fn validate_rejects_bad_gamma() {
        let config = PixelServerConfig {
            gamma: [3.0, f64::NAN, 3.0],
            ..PixelServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGamma(_))));
    }

    #[test]
    fn validate_rejects_empty_panel() {
        let config = PixelServerConfig {
            panel: PanelConfig::new(0, 10),
            ..PixelServerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPanel { rows: 0, cols: 10 })
        );
    }

    #[rstest]
    #[case(65536, 65536)]
    #[case(200, 200)]
    #[case(1, 21_836)]
    fn validate_rejects_oversized_panel(#[case] rows: u32, #[case] cols: u32) {
        let config = PixelServerConfig {
            panel: PanelConfig::new(rows, cols),
            ..PixelServerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPanel { rows, cols })
        );
    }

    #[test]
    fn validate_accepts_largest_datagram_panel() {
        let config = PixelServerConfig {
            panel: PanelConfig::new(1, 21_835),
            ..PixelServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_clock() {
        let mut config = PixelServerConfig::default();
        config.bus.clock_hz = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidClockRate));
    }
}
