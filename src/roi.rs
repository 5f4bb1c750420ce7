//! Skin-region sampling
//!
//! Places three regions (forehead and both cheeks) on the face box and reduces
//! each to one green-channel intensity per frame. Pixels are first filtered by
//! a skin mask: the AND of a YCrCb range test and an HSV range test, cleaned up
//! with a morphological close followed by an open.

use crate::config::{RoiWeights, SkinThresholds};
use crate::frame::{ChannelOrder, Frame};
use crate::types::{FaceBox, Rect, Region, RoiDefinition, RoiSample, REGION_COUNT};

/// Guard for the dispersion denominator
const DISPERSION_EPSILON: f64 = 1e-10;

/// Dispersion reported when no skin pixel survived the mask
pub const UNTRUSTED_DISPERSION: f64 = 1.0;

/// 5x5 elliptical structuring element, as (dx, dy) offsets from the center
const ELLIPSE_5X5: [(i32, i32); 17] = [
    (0, -2),
    (-2, -1),
    (-1, -1),
    (0, -1),
    (1, -1),
    (2, -1),
    (-2, 0),
    (-1, 0),
    (0, 0),
    (1, 0),
    (2, 0),
    (-2, 1),
    (-1, 1),
    (0, 1),
    (1, 1),
    (2, 1),
    (0, 2),
];

/// Fractional placement of a region inside the face box: (x0, x1, y0, y1)
fn placement(region: Region) -> (f64, f64, f64, f64) {
    match region {
        Region::Forehead => (0.10, 0.90, 0.01, 0.15),
        Region::LeftCheek => (0.05, 0.35, 0.40, 0.65),
        Region::RightCheek => (0.65, 0.95, 0.40, 0.65),
    }
}

/// Place the three regions on the current face box
pub fn define_regions(face: &FaceBox, weights: &RoiWeights) -> [RoiDefinition; REGION_COUNT] {
    let static_weights = weights.as_array();
    let (w, h) = (face.width as f64, face.height as f64);

    Region::ALL.map(|region| {
        let (fx0, fx1, fy0, fy1) = placement(region);
        RoiDefinition {
            region,
            rect: Rect {
                x1: face.x.saturating_add((w * fx0) as i32),
                y1: face.y.saturating_add((h * fy0) as i32),
                x2: face.x.saturating_add((w * fx1) as i32),
                y2: face.y.saturating_add((h * fy1) as i32),
            },
            weight: static_weights[region.index()],
            label: region.label().to_string(),
            kind: region.kind(),
            color: region.color(),
        }
    })
}

/// Extracts per-region samples from frames
#[derive(Debug, Clone, Default)]
pub struct RoiSampler {
    thresholds: SkinThresholds,
}

impl RoiSampler {
    pub fn new(thresholds: SkinThresholds) -> Self {
        Self { thresholds }
    }

    /// Sample every region of the frame, in region order
    pub fn sample_all(
        &self,
        frame: &Frame,
        regions: &[RoiDefinition; REGION_COUNT],
    ) -> [RoiSample; REGION_COUNT] {
        [
            self.extract_signal(frame, &regions[0]),
            self.extract_signal(frame, &regions[1]),
            self.extract_signal(frame, &regions[2]),
        ]
    }

    /// Reduce one region of the frame to a green intensity and a dispersion proxy
    pub fn extract_signal(&self, frame: &Frame, roi: &RoiDefinition) -> RoiSample {
        let Some(rect) = roi.rect.clip(frame.width(), frame.height()) else {
            return RoiSample::missing();
        };

        let mask = self.skin_mask(frame, &rect);
        let (w, h) = (rect.width() as usize, rect.height() as usize);
        let (x0, y0) = (rect.x1 as usize, rect.y1 as usize);

        let mut skin_green = Vec::new();
        let mut all_green_sum = 0.0;
        for dy in 0..h {
            for dx in 0..w {
                let green = frame.pixel(x0 + dx, y0 + dy)[ChannelOrder::GREEN] as f64;
                all_green_sum += green;
                if mask.get(dx, dy) {
                    skin_green.push(green);
                }
            }
        }

        if skin_green.is_empty() {
            return RoiSample {
                intensity: all_green_sum / (w * h) as f64,
                dispersion: Some(UNTRUSTED_DISPERSION),
            };
        }

        let n = skin_green.len() as f64;
        let mean = skin_green.iter().sum::<f64>() / n;
        let variance = skin_green.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n;

        RoiSample {
            intensity: mean,
            dispersion: Some(variance.sqrt() / (mean + DISPERSION_EPSILON)),
        }
    }

    /// Binary skin mask over a clipped rectangle
    fn skin_mask(&self, frame: &Frame, rect: &Rect) -> Mask {
        let (w, h) = (rect.width() as usize, rect.height() as usize);
        let (x0, y0) = (rect.x1 as usize, rect.y1 as usize);
        let t = &self.thresholds;

        let mut mask = Mask::new(w, h);
        for dy in 0..h {
            for dx in 0..w {
                let rgb = frame.rgb(x0 + dx, y0 + dy);
                let skin = in_range(rgb_to_ycrcb(rgb), t.ycrcb_lower, t.ycrcb_upper)
                    && in_range(rgb_to_hsv(rgb), t.hsv_lower, t.hsv_upper);
                mask.set(dx, dy, skin);
            }
        }

        // close, then open
        mask.dilate().erode().erode().dilate()
    }
}

/// Inclusive per-channel range test
fn in_range(value: [u8; 3], lower: [u8; 3], upper: [u8; 3]) -> bool {
    (0..3).all(|c| value[c] >= lower[c] && value[c] <= upper[c])
}

fn saturate(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// 8-bit RGB to (Y, Cr, Cb)
pub fn rgb_to_ycrcb(rgb: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (rgb[0] as f64, rgb[1] as f64, rgb[2] as f64);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cr = (r - y) * 0.713 + 128.0;
    let cb = (b - y) * 0.564 + 128.0;
    [saturate(y), saturate(cr), saturate(cb)]
}

/// 8-bit RGB to (H, S, V) with hue halved into 0-179
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (rgb[0] as f64, rgb[1] as f64, rgb[2] as f64);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };

    let mut hue = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    let h = (hue / 2.0).round();
    [if h >= 180.0 { 0 } else { h as u8 }, saturate(s), saturate(v)]
}

/// Row-major boolean mask
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mask {
    bits: Vec<bool>,
    width: usize,
    height: usize,
}

impl Mask {
    fn new(width: usize, height: usize) -> Self {
        Self {
            bits: vec![false; width * height],
            width,
            height,
        }
    }

    fn get(&self, x: usize, y: usize) -> bool {
        self.bits[y * self.width + x]
    }

    fn set(&mut self, x: usize, y: usize, value: bool) {
        self.bits[y * self.width + x] = value;
    }

    fn erode(&self) -> Mask {
        self.apply(true)
    }

    fn dilate(&self) -> Mask {
        self.apply(false)
    }

    /// Min (erode) or max (dilate) over the structuring element. Offsets that
    /// fall outside the mask are skipped.
    fn apply(&self, erode: bool) -> Mask {
        let mut out = Mask::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut neighbors = ELLIPSE_5X5.iter().filter_map(|&(dx, dy)| {
                    let nx = x as i64 + dx as i64;
                    let ny = y as i64 + dy as i64;
                    if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
                        None
                    } else {
                        Some(self.get(nx as usize, ny as usize))
                    }
                });
                let value = if erode {
                    neighbors.all(|b| b)
                } else {
                    neighbors.any(|b| b)
                };
                out.set(x, y, value);
            }
        }
        out
    }
}
