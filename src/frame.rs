//! Pixel frames
//!
//! A frame is a row-major, 3-channel, 8-bit image as delivered by the
//! acquisition loop. The shape is checked once at construction so the samplers
//! can index without bounds surprises.

use crate::error::PulseError;
use serde::{Deserialize, Serialize};

/// Channel layout of a packed 3-channel pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Blue, green, red (OpenCV capture order)
    #[default]
    Bgr,
    /// Red, green, blue
    Rgb,
}

impl ChannelOrder {
    /// Index of the green channel within a pixel
    pub const GREEN: usize = 1;

    /// Index of the red channel within a pixel
    pub fn red_index(self) -> usize {
        match self {
            ChannelOrder::Bgr => 2,
            ChannelOrder::Rgb => 0,
        }
    }

    /// Index of the blue channel within a pixel
    pub fn blue_index(self) -> usize {
        match self {
            ChannelOrder::Bgr => 0,
            ChannelOrder::Rgb => 2,
        }
    }

    /// Parse from the integer code used across the C ABI (0 = BGR, 1 = RGB)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ChannelOrder::Bgr),
            1 => Some(ChannelOrder::Rgb),
            _ => None,
        }
    }
}

/// An owned height x width x 3 pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: usize,
    height: usize,
    order: ChannelOrder,
}

impl Frame {
    /// Wrap raw pixel bytes, checking that the buffer matches the stated shape
    pub fn new(
        data: Vec<u8>,
        width: usize,
        height: usize,
        order: ChannelOrder,
    ) -> Result<Self, PulseError> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| PulseError::InvalidFrame(format!("{width}x{height} overflows")))?;

        if data.len() != expected {
            return Err(PulseError::InvalidFrame(format!(
                "expected {} bytes for {}x{}x3, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            order,
        })
    }

    /// A frame filled with one color, given as (r, g, b)
    pub fn filled(width: usize, height: usize, order: ChannelOrder, rgb: [u8; 3]) -> Self {
        let mut pixel = [0u8; 3];
        pixel[order.red_index()] = rgb[0];
        pixel[ChannelOrder::GREEN] = rgb[1];
        pixel[order.blue_index()] = rgb[2];

        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width * height * 3)
            .collect();

        Self {
            data,
            width,
            height,
            order,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Packed pixel at (x, y) in storage order. Caller guarantees bounds.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let idx = (y * self.width + x) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Pixel at (x, y) reordered to (r, g, b)
    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let px = self.pixel(x, y);
        [
            px[self.order.red_index()],
            px[ChannelOrder::GREEN],
            px[self.order.blue_index()],
        ]
    }

    /// Overwrite the pixel at (x, y) from an (r, g, b) triple
    pub fn set_rgb(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y * self.width + x) * 3;
        self.data[idx + self.order.red_index()] = rgb[0];
        self.data[idx + ChannelOrder::GREEN] = rgb[1];
        self.data[idx + self.order.blue_index()] = rgb[2];
    }

    /// Horizontally flipped copy (selfie view)
    pub fn mirrored(&self) -> Frame {
        let mut data = Vec::with_capacity(self.data.len());
        let stride = self.width * 3;
        for row in self.data.chunks_exact(stride.max(1)) {
            for px in row.chunks_exact(3).rev() {
                data.extend_from_slice(px);
            }
        }

        Frame {
            data,
            width: self.width,
            height: self.height,
            order: self.order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_check() {
        assert!(Frame::new(vec![0; 12], 2, 2, ChannelOrder::Bgr).is_ok());
        assert!(matches!(
            Frame::new(vec![0; 11], 2, 2, ChannelOrder::Bgr),
            Err(PulseError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_rgb_access_respects_order() {
        let bgr = Frame::filled(2, 2, ChannelOrder::Bgr, [10, 20, 30]);
        assert_eq!(bgr.pixel(0, 0), [30, 20, 10]);
        assert_eq!(bgr.rgb(1, 1), [10, 20, 30]);

        let rgb = Frame::filled(2, 2, ChannelOrder::Rgb, [10, 20, 30]);
        assert_eq!(rgb.pixel(0, 0), [10, 20, 30]);
        assert_eq!(rgb.rgb(1, 0), [10, 20, 30]);
    }

    #[test]
    fn test_mirrored() {
        let mut frame = Frame::filled(3, 1, ChannelOrder::Rgb, [0, 0, 0]);
        frame.set_rgb(0, 0, [1, 2, 3]);
        let flipped = frame.mirrored();
        assert_eq!(flipped.rgb(2, 0), [1, 2, 3]);
        assert_eq!(flipped.rgb(0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_channel_codes() {
        assert_eq!(ChannelOrder::from_code(0), Some(ChannelOrder::Bgr));
        assert_eq!(ChannelOrder::from_code(1), Some(ChannelOrder::Rgb));
        assert_eq!(ChannelOrder::from_code(7), None);
    }
}
