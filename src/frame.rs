//! Validation of received datagrams.
//!
//! A datagram is a flat run of interleaved RGB bytes with no header. Two
//! things can be off about it, and neither rejects the frame:
//! - a trailing partial pixel, which is dropped
//! - a length that does not cover the whole panel, which is allowed because
//!   a client may drive only part of the panel

use crate::gamma::CHANNELS;
use crate::PanelConfig;
use thiserror::Error;

/// Something unexpected about a frame's length.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAnomaly {
    #[error("received {received} bytes, not a multiple of 3; only the first {used} bytes are used")]
    PartialPixel { received: usize, used: usize },

    #[error("received {received} bytes, expected {expected}")]
    LengthMismatch { received: usize, expected: usize },
}

/// Splits receive buffers into whole pixels for one panel size.
#[derive(Clone, Copy, Debug)]
pub struct FrameDecoder {
    expected_len: usize,
}

impl FrameDecoder {
    pub fn new(panel: PanelConfig) -> Self {
        Self {
            expected_len: panel.frame_byte_count(),
        }
    }

    /// Byte length of a frame covering the whole panel.
    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    /// Decode the first `received` bytes of `buf`.
    ///
    /// At most one anomaly is reported per frame. A partial trailing pixel
    /// takes precedence; otherwise the usable length is compared against
    /// the panel size.
    pub fn decode<'a>(&self, buf: &'a mut [u8], received: usize) -> DecodedFrame<'a> {
        let received = received.min(buf.len());
        let used = received - received % CHANNELS;

        let anomaly = if used != received {
            Some(FrameAnomaly::PartialPixel { received, used })
        } else if used != self.expected_len {
            Some(FrameAnomaly::LengthMismatch {
                received,
                expected: self.expected_len,
            })
        } else {
            None
        };

        DecodedFrame {
            pixels: &mut buf[..used],
            anomaly,
        }
    }
}

/// The whole pixels of one received frame.
#[derive(Debug)]
pub struct DecodedFrame<'a> {
    pixels: &'a mut [u8],
    anomaly: Option<FrameAnomaly>,
}

impl DecodedFrame<'_> {
    pub fn anomaly(&self) -> Option<FrameAnomaly> {
        self.anomaly
    }

    /// Number of complete pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        self.pixels.len() / CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// The usable bytes, always a multiple of 3 long.
    pub fn as_bytes(&self) -> &[u8] {
        &*self.pixels
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(PanelConfig::default())
    }

    #[test]
    fn full_frame_has_no_anomaly() {
        let mut buf = vec![7u8; 1024];
        let frame = decoder().decode(&mut buf, 300);
        assert_eq!(frame.anomaly(), None);
        assert_eq!(frame.pixel_count(), 100);
        assert_eq!(frame.as_bytes().len(), 300);
    }

    #[test]
    fn partial_pixel_is_dropped() {
        let mut buf = vec![1u8; 1024];
        let frame = decoder().decode(&mut buf, 301);
        assert_eq!(
            frame.anomaly(),
            Some(FrameAnomaly::PartialPixel {
                received: 301,
                used: 300
            })
        );
        assert_eq!(frame.as_bytes().len(), 300);
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(150)]
    #[case(600)]
    fn short_or_long_frames_are_kept(#[case] received: usize) {
        let mut buf = vec![0u8; 1024];
        let frame = decoder().decode(&mut buf, received);
        assert_eq!(
            frame.anomaly(),
            Some(FrameAnomaly::LengthMismatch {
                received,
                expected: 300
            })
        );
        assert_eq!(frame.pixel_count(), received / 3);
    }

    #[rstest]
    #[case(1, 0)]
    #[case(2, 0)]
    #[case(5, 3)]
    #[case(1000, 999)]
    fn remainder_is_trimmed(#[case] received: usize, #[case] used: usize) {
        let mut buf = vec![0u8; 1024];
        let frame = decoder().decode(&mut buf, received);
        assert_eq!(frame.as_bytes().len(), used);
    }

    #[test]
    fn received_is_clamped_to_buffer() {
        let mut buf = vec![0u8; 9];
        let frame = decoder().decode(&mut buf, 300);
        assert_eq!(frame.as_bytes().len(), 9);
    }

    #[test]
    fn prefix_keeps_pixel_order() {
        let mut buf = vec![1, 2, 3, 4, 5, 6, 7];
        let frame = decoder().decode(&mut buf, 7);
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.pixel_count(), 2);
    }

    #[rstest]
    #[case(150, "received 150 bytes, expected 300")]
    #[case(600, "received 600 bytes, expected 300")]
    fn length_mismatch_message_fits_short_and_long_frames(
        #[case] received: usize,
        #[case] message: &str,
    ) {
        let anomaly = FrameAnomaly::LengthMismatch {
            received,
            expected: 300,
        };
        assert_eq!(anomaly.to_string(), message);
    }
}
