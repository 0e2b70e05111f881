//! Per-channel gamma correction.
//!
//! Each color channel has its own 256-entry lookup table derived from a
//! floating-point exponent: `table[i] = round(255 * (i / 255)^g)`.
//!
//! Tables are never edited in place. `GammaTables::set_gamma` builds a fresh
//! table and swaps the `Arc` under a short write lock, so the transmission
//! loop, which clones the three `Arc`s once per frame, always works on whole
//! tables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Number of color channels in a pixel.
pub const CHANNELS: usize = 3;

/// One color channel of an RGB pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    /// All channels in wire order.
    pub const ALL: [Channel; CHANNELS] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Offset of this channel inside an RGB triple.
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── GammaTable ───────────────────────────────────────────────────────

/// Check that `exponent` can produce a valid table.
///
/// `g <= 0` would map 0 to full brightness, so only finite positive
/// exponents are accepted.
pub fn validate_exponent(exponent: f64) -> Result<f64, ConfigError> {
    if exponent.is_finite() && exponent > 0.0 {
        Ok(exponent)
    } else {
        Err(ConfigError::InvalidGamma(exponent))
    }
}

/// An immutable lookup table for one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct GammaTable {
    exponent: f64,
    table: [u8; 256],
}

impl GammaTable {
    pub fn new(exponent: f64) -> Result<Self, ConfigError> {
        let exponent = validate_exponent(exponent)?;
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let normalized = i as f64 / 255.0;
            *entry = (255.0 * normalized.powf(exponent)).round() as u8;
        }
        Ok(Self { exponent, table })
    }

    /// The table for `g = 1.0`, which leaves every sample unchanged.
    pub fn identity() -> Self {
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = i as u8;
        }
        Self {
            exponent: 1.0,
            table,
        }
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    #[inline]
    pub fn apply(&self, sample: u8) -> u8 {
        self.table[sample as usize]
    }

    pub fn as_bytes(&self) -> &[u8; 256] {
        &self.table
    }
}

// ── GammaTables ──────────────────────────────────────────────────────

/// The three channel tables, shared between the receive loop and any
/// control thread.
#[derive(Debug)]
pub struct GammaTables {
    channels: [RwLock<Arc<GammaTable>>; CHANNELS],
}

impl GammaTables {
    /// Build tables from `[red, green, blue]` exponents.
    pub fn new(exponents: [f64; CHANNELS]) -> Result<Self, ConfigError> {
        let [r, g, b] = exponents;
        Ok(Self {
            channels: [
                RwLock::new(Arc::new(GammaTable::new(r)?)),
                RwLock::new(Arc::new(GammaTable::new(g)?)),
                RwLock::new(Arc::new(GammaTable::new(b)?)),
            ],
        })
    }

    /// Replace the whole table for `channel`.
    ///
    /// The new table is computed before the lock is taken; readers either
    /// see the old table or the new one.
    pub fn set_gamma(&self, channel: Channel, exponent: f64) -> Result<(), ConfigError> {
        let table = Arc::new(GammaTable::new(exponent)?);
        *self.channels[channel.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner) = table;
        Ok(())
    }

    /// The exponent currently in effect for `channel`.
    pub fn gamma(&self, channel: Channel) -> f64 {
        self.table(channel).exponent()
    }

    /// Exponents for all three channels, in RGB order.
    pub fn gammas(&self) -> GammaReport {
        GammaReport {
            red: self.gamma(Channel::Red),
            green: self.gamma(Channel::Green),
            blue: self.gamma(Channel::Blue),
        }
    }

    pub fn apply(&self, channel: Channel, sample: u8) -> u8 {
        self.table(channel).apply(sample)
    }

    /// Current table for `channel`.
    pub fn table(&self, channel: Channel) -> Arc<GammaTable> {
        Arc::clone(
            &self.channels[channel.index()]
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Grab all three tables at once for correcting one frame.
    pub fn snapshot(&self) -> GammaSnapshot {
        GammaSnapshot {
            tables: Channel::ALL.map(|channel| self.table(channel)),
        }
    }
}

/// The tables one frame is corrected with.
#[derive(Clone, Debug)]
pub struct GammaSnapshot {
    tables: [Arc<GammaTable>; CHANNELS],
}

impl GammaSnapshot {
    /// Correct interleaved RGB bytes in place.
    ///
    /// A trailing partial pixel is left untouched.
    pub fn correct_in_place(&self, pixels: &mut [u8]) {
        let [r, g, b] = &self.tables;
        for pixel in pixels.chunks_exact_mut(CHANNELS) {
            pixel[0] = r.apply(pixel[0]);
            pixel[1] = g.apply(pixel[1]);
            pixel[2] = b.apply(pixel[2]);
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────

/// The exponents in effect, as reported on `SIGUSR1` and by the API.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GammaReport {
    #[schema(example = 3.0)]
    pub red: f64,
    #[schema(example = 3.0)]
    pub green: f64,
    #[schema(example = 3.0)]
    pub blue: f64,
}

impl fmt::Display for GammaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Current gamma values for red, green, blue: {:.6}, {:.6}, {:.6}",
            self.red, self.green, self.blue
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────────
