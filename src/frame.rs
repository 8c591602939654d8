//! Frame containers.
//!
//! - `Frame`: owned RGB24 capture handed from a frame source to the capture loop.
//! - `GrayFrame`: luma plane derived from a `Frame`, used by scene analysis and
//!   motion scoring.
//!
//! Frames are ephemeral. The capture loop owns each `Frame` for exactly one
//! iteration; the scene analyzer keeps at most one `GrayFrame` (the previous
//! tick) and replaces it every tick.

use anyhow::{anyhow, Result};
use std::fmt;

/// Upper bound on either frame dimension accepted from a source.
pub const MAX_FRAME_DIM: u32 = 8192;

// ----------------------------------------------------------------------------
// Frame: RGB24 capture
// ----------------------------------------------------------------------------

/// One RGB24 capture (row-major, 3 bytes per pixel).
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap an RGB24 buffer. The buffer length must be `width * height * 3`.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let len = rgb_len(width, height)?;
        let mut pixels = Vec::with_capacity(len);
        for _ in 0..(len / 3) {
            pixels.extend_from_slice(&rgb);
        }
        Self::from_rgb(pixels, width, height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// BT.601 luma conversion.
    pub fn to_gray(&self) -> GrayFrame {
        let data = self
            .pixels
            .chunks_exact(3)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayFrame {
            data,
            width: self.width,
            height: self.height,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero"));
    }
    if width > MAX_FRAME_DIM || height > MAX_FRAME_DIM {
        return Err(anyhow!(
            "frame {}x{} exceeds maximum dimension {}",
            width,
            height,
            MAX_FRAME_DIM
        ));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// GrayFrame: luma plane
// ----------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct GrayFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("gray frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "gray frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Mean absolute per-pixel difference against another plane of the same size.
    pub fn mean_abs_diff(&self, other: &GrayFrame) -> Result<f64> {
        if self.width != other.width || self.height != other.height {
            return Err(anyhow!(
                "cannot diff {}x{} against {}x{}",
                self.width,
                self.height,
                other.width,
                other.height
            ));
        }
        if self.data.is_empty() {
            return Err(anyhow!("cannot diff empty frames"));
        }
        let total: u64 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum();
        Ok(total as f64 / self.data.len() as f64)
    }
}

impl fmt::Debug for GrayFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrayFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2).is_err());
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_rgb(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn gray_conversion_uses_luma_weights() -> Result<()> {
        let frame = Frame::solid(2, 1, [255, 0, 0])?;
        let gray = frame.to_gray();
        assert_eq!(gray.data(), &[76, 76]);

        let white = Frame::solid(1, 1, [255, 255, 255])?.to_gray();
        assert_eq!(white.data(), &[255]);
        Ok(())
    }

    #[test]
    fn mean_abs_diff_rejects_mismatched_sizes() -> Result<()> {
        let a = GrayFrame::new(vec![10, 20, 30, 40], 2, 2)?;
        let b = GrayFrame::new(vec![12, 18, 30, 44], 2, 2)?;
        assert_eq!(a.mean_abs_diff(&b)?, 2.0);

        let c = GrayFrame::new(vec![0; 6], 3, 2)?;
        assert!(a.mean_abs_diff(&c).is_err());
        Ok(())
    }
}
