use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};

/// Inclusive pixel rectangle of a frame.
///
/// The vertical axis grows upwards: `bottom == 0` is the lowest row of the frame. Bounds are
/// inclusive, so a region covering a `w x h` frame is `left=0, right=w-1, bottom=0, top=h-1`.
/// An empty region has `right == left - 1` (or `top == bottom - 1`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderRegion {
    /// Leftmost column, inclusive.
    pub left: i32,
    /// Rightmost column, inclusive.
    pub right: i32,
    /// Lowest row, inclusive.
    pub bottom: i32,
    /// Highest row, inclusive.
    pub top: i32,
}

impl Default for RenderRegion {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl RenderRegion {
    /// Region with zero area anchored at the origin.
    pub const EMPTY: Self = Self {
        left: 0,
        right: -1,
        bottom: 0,
        top: -1,
    };

    /// Validate and build a region from inclusive bounds.
    pub fn new(left: i32, right: i32, bottom: i32, top: i32) -> RenderResult<Self> {
        if left < 0 || bottom < 0 {
            return Err(RenderError::invalid_usage(format!(
                "region origin must be non-negative, got left={left} bottom={bottom}"
            )));
        }
        if right < left - 1 || top < bottom - 1 {
            return Err(RenderError::invalid_usage(format!(
                "region bounds are inverted: left={left} right={right} bottom={bottom} top={top}"
            )));
        }
        Ok(Self {
            left,
            right,
            bottom,
            top,
        })
    }

    /// Full-frame region for a `width x height` frame.
    pub fn from_size(width: u32, height: u32) -> Self {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        Self {
            left: 0,
            right: w - 1,
            bottom: 0,
            top: h - 1,
        }
    }

    /// Region of `width x height` pixels whose lower-left corner is `(x, y)`.
    pub fn from_origin(x: u32, y: u32, width: u32, height: u32) -> RenderResult<Self> {
        let conv = |v: u32| {
            i32::try_from(v)
                .map_err(|_| RenderError::invalid_usage(format!("region value {v} overflows")))
        };
        let (x, y, w, h) = (conv(x)?, conv(y)?, conv(width)?, conv(height)?);
        Self::new(x, x + w - 1, y, y + h - 1)
    }

    /// Number of columns covered.
    pub fn width(&self) -> u32 {
        (i64::from(self.right) - i64::from(self.left) + 1).max(0) as u32
    }

    /// Number of rows covered.
    pub fn height(&self) -> u32 {
        (i64::from(self.top) - i64::from(self.bottom) + 1).max(0) as u32
    }

    /// Pixel count covered by the region.
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// True when either dimension is zero.
    pub fn is_zero_area(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// True when the pixel `(x, y)` (y up) lies inside the region.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.bottom && y <= self.top
    }

    /// True when the region lies inside a `width x height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.is_zero_area()
            || (self.left >= 0
                && self.bottom >= 0
                && i64::from(self.right) < i64::from(width)
                && i64::from(self.top) < i64::from(height))
    }

    /// True when the region equals the full `width x height` frame.
    pub fn is_full_frame(&self, width: u32, height: u32) -> bool {
        *self == Self::from_size(width, height)
    }

    /// True when the two regions share at least one pixel.
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_zero_area()
            && !other.is_zero_area()
            && self.left <= other.right
            && other.left <= self.right
            && self.bottom <= other.top
            && other.bottom <= self.top
    }
}

/// Linear RGBA pixel stored as four 32-bit floats.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgba32F {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Rgba32F {
    /// All components zero.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    /// Opaque black.
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Construct from components.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour from an RGB triple.
    pub const fn opaque(rgb: [f32; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2], 1.0)
    }

    /// Same value in all four components.
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v, v)
    }

    /// Components as an array.
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Multiply every component by `s`.
    pub fn scale(self, s: f32) -> Self {
        Self::new(self.r * s, self.g * s, self.b * s, self.a * s)
    }

    /// Component-wise sum.
    pub fn add(self, o: Self) -> Self {
        Self::new(self.r + o.r, self.g + o.g, self.b + o.b, self.a + o.a)
    }

    /// Linear interpolation towards `o` by `t`.
    pub fn lerp(self, o: Self, t: f32) -> Self {
        Self::new(
            self.r + (o.r - self.r) * t,
            self.g + (o.g - self.g) * t,
            self.b + (o.b - self.b) * t,
            self.a + (o.a - self.a) * t,
        )
    }
}

/// Result of an operation that may be cooperatively aborted.
///
/// `Aborted` means "state unchanged, try again"; errors travel separately in
/// [`RenderResult`].
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran to completion.
    Finished(T),
    /// The operation stopped at a checkpoint because cancellation was requested.
    Aborted,
}

impl<T> Outcome<T> {
    /// True for [`Outcome::Finished`].
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// True for [`Outcome::Aborted`].
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Return the finished value, if any.
    pub fn finished(self) -> Option<T> {
        match self {
            Self::Finished(v) => Some(v),
            Self::Aborted => None,
        }
    }

    /// Map the finished value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Finished(v) => Outcome::Finished(f(v)),
            Self::Aborted => Outcome::Aborted,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
