//! Pixel-streaming daemon for an SPI-driven LED panel.
//!
//! A remote client streams raw RGB frames over UDP; the daemon gamma-corrects
//! every channel and shifts the corrected bytes out over the SPI bus.
//!
//! This crate root holds the panel configuration shared by every module.
//!
//! It also re-exports the modules used by the main binary:
//! - `gamma`: per-channel gamma tables with snapshot-and-swap updates
//! - `frame`: validation of received datagrams
//! - `bus`: the SPI transmitter and its null stand-in
//! - `server`: the receive/correct/transmit loop and its lifecycle
//! - `lifecycle`: mapping of process signals onto the server
//! - `api`: optional HTTP control surface

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod frame;
pub mod gamma;
pub mod lifecycle;
pub mod server;

pub use config::PixelServerConfig;
pub use error::{BusError, ConfigError, ServerError};
pub use gamma::Channel;
pub use server::PixelServer;

use serde::Serialize;

// ── Panel configuration ────────────────────────────────────────────

/// Dimensions of the LED panel behind the bus.
///
/// The panel is a chain of addressable pixels; rows and columns only
/// matter for computing how many bytes a full frame carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
}

impl PanelConfig {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Total number of pixels on the panel.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.cols)
    }

    /// Number of bytes needed for a raw RGB frame (3 bytes per pixel).
    ///
    /// Saturates at `usize::MAX`; `PixelServerConfig::validate` rejects
    /// panels that large.
    pub fn frame_byte_count(&self) -> usize {
        self.checked_frame_byte_count().unwrap_or(usize::MAX)
    }

    /// Like `frame_byte_count`, but `None` if the size does not fit in `usize`.
    pub fn checked_frame_byte_count(&self) -> Option<usize> {
        self.pixel_count()
            .checked_mul(3)
            .and_then(|bytes| usize::try_from(bytes).ok())
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self { rows: 10, cols: 10 }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
