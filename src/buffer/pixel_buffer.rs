use crate::foundation::core::{RenderRegion, Rgba32F};
use crate::foundation::error::{RenderError, RenderResult};

/// Contiguous, resizable store of [`Rgba32F`] pixels in top-down row-major order.
///
/// `len() == width() * height()` holds after every public call. Resizing to the same pixel count
/// keeps the existing allocation and its contents; any other count replaces the storage with
/// transparent pixels. Equality compares size and pixels, not allocation history.
#[derive(Clone, Debug, Default)]
pub struct PixelBuffer {
    data: Vec<Rgba32F>,
    width: u32,
    height: u32,
    allocations: u64,
}

impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.data == other.data
    }
}

impl PixelBuffer {
    /// Create an unallocated buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding `width x height` transparent pixels.
    pub fn with_size(width: u32, height: u32) -> Self {
        let mut out = Self::new();
        out.resize_2d(width, height);
        out
    }

    /// Wrap existing pixels. `pixels.len()` must equal `width * height`.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgba32F>) -> RenderResult<Self> {
        let expected = pixel_count(width, height);
        if pixels.len() != expected {
            return Err(RenderError::invalid_usage(format!(
                "pixel data has {} records, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self {
            data: pixels,
            width,
            height,
            allocations: 1,
        })
    }

    /// True when storage is held.
    pub fn is_allocated(&self) -> bool {
        !self.data.is_empty()
    }

    /// Number of pixel records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no pixels are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of times storage has been (re)allocated over the buffer's lifetime.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Resize to a flat run of `count` pixels (`count x 1`).
    pub fn resize(&mut self, count: usize) {
        self.reallocate(count);
        self.width = u32::try_from(count).unwrap_or(u32::MAX);
        self.height = u32::from(count > 0);
    }

    /// Resize to `width x height` pixels.
    pub fn resize_2d(&mut self, width: u32, height: u32) {
        self.reallocate(pixel_count(width, height));
        self.width = width;
        self.height = height;
    }

    fn reallocate(&mut self, count: usize) {
        if self.data.len() == count {
            return;
        }
        self.data = vec![Rgba32F::TRANSPARENT; count];
        if count > 0 {
            self.allocations = self.allocations.saturating_add(1);
        }
    }

    /// Release storage. Safe to call on an unallocated buffer.
    pub fn reset(&mut self) {
        self.data = Vec::new();
        self.width = 0;
        self.height = 0;
    }

    /// Borrow the pixels.
    pub fn as_slice(&self) -> &[Rgba32F] {
        &self.data
    }

    /// Mutably borrow the pixels.
    pub fn as_mut_slice(&mut self) -> &mut [Rgba32F] {
        &mut self.data
    }

    /// Pixel at column `x`, top-down row `y`.
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba32F> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Set every pixel to `px`.
    pub fn fill(&mut self, px: Rgba32F) {
        self.data.fill(px);
    }

    /// Mirror rows top to bottom.
    pub fn flip_vertical(&mut self) {
        let w = self.width as usize;
        let h = self.height as usize;
        if w == 0 {
            return;
        }
        for y in 0..h / 2 {
            let (upper, lower) = self.data.split_at_mut((h - 1 - y) * w);
            upper[y * w..(y + 1) * w].swap_with_slice(&mut lower[..w]);
        }
    }

    /// Write a top-down tile covering `region` into this full-frame buffer.
    ///
    /// The buffer must already hold `total_width x total_height` pixels. Region rows count
    /// upwards, so the tile's first row lands on frame row `total_height - 1 - region.top`.
    pub fn overwrite(
        &mut self,
        input: &[Rgba32F],
        region: &RenderRegion,
        total_width: u32,
        total_height: u32,
    ) -> RenderResult<()> {
        if self.data.len() != pixel_count(total_width, total_height) {
            return Err(RenderError::invalid_usage(format!(
                "overwrite target holds {} pixels, expected {total_width}x{total_height}",
                self.data.len()
            )));
        }
        if !region.fits_within(total_width, total_height) {
            return Err(RenderError::invalid_usage(format!(
                "tile region {region:?} exceeds {total_width}x{total_height}"
            )));
        }
        let w = region.width() as usize;
        let h = region.height() as usize;
        if input.len() < w * h {
            return Err(RenderError::invalid_usage(format!(
                "tile input holds {} pixels, region needs {}",
                input.len(),
                w * h
            )));
        }
        let total_w = total_width as usize;
        let shift_y = (total_height as i64 - 1 - i64::from(region.top)) as usize;
        for y in 0..h {
            let dst = region.left as usize + (shift_y + y) * total_w;
            self.data[dst..dst + w].copy_from_slice(&input[y * w..(y + 1) * w]);
        }
        Ok(())
    }

    /// Pixels as a flat `r, g, b, a` float array.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.iter().flat_map(|p| p.to_array()).collect()
    }

    /// Pixels clamped to `[0, 1]` and quantized to 8 bits per component.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data
            .iter()
            .flat_map(|p| p.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8))
            .collect()
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize)
}

#[cfg(test)]
#[path = "../../tests/unit/buffer/pixel_buffer.rs"]
mod tests;
