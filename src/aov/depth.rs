use serde::{Deserialize, Serialize};

use crate::foundation::core::Rgba32F;

/// Remaps raw depth values into `[0, 1]` grey.
///
/// Only pixels with `r > 0` carry depth; background pixels are left alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthNormalization {
    /// Search min and max over the valid pixels instead of using the fixed bounds.
    pub auto_normalize: bool,
    /// Output `1 - v`.
    pub invert: bool,
    /// Depth mapped to 0.
    pub min: f32,
    /// Depth mapped to 1.
    pub max: f32,
}

fn is_valid_depth(px: &Rgba32F) -> bool {
    px.r > 0.0
}

impl DepthNormalization {
    /// Smallest and largest valid depth, or `None` when no pixel is valid.
    pub fn search_min_max(pixels: &[Rgba32F]) -> Option<(f32, f32)> {
        pixels
            .iter()
            .filter(|p| is_valid_depth(p))
            .fold(None, |acc, p| match acc {
                None => Some((p.r, p.r)),
                Some((lo, hi)) => Some((lo.min(p.r), hi.max(p.r))),
            })
    }

    /// Normalize `pixels` in place.
    pub fn apply(&self, pixels: &mut [Rgba32F]) {
        let (min, max) = if self.auto_normalize {
            match Self::search_min_max(pixels) {
                Some(bounds) => bounds,
                None => return,
            }
        } else {
            (self.min, self.max)
        };

        for px in pixels.iter_mut().filter(|p| is_valid_depth(p)) {
            let mut v = if px.r >= max {
                1.0
            } else if px.r <= min {
                0.0
            } else {
                (px.r - min) / (max - min)
            };
            if self.invert {
                v = 1.0 - v;
            }
            px.r = v;
            px.g = v;
            px.b = v;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aov/depth.rs"]
mod tests;
