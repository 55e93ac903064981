use std::path::Path;

use anyhow::Context as _;

use crate::buffer::pixel_buffer::PixelBuffer;
use crate::foundation::core::Rgba32F;
use crate::foundation::error::RenderResult;

/// Decode encoded image bytes into float RGBA pixels.
pub fn decode_image(bytes: &[u8]) -> RenderResult<PixelBuffer> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    to_pixel_buffer(dyn_img)
}

/// Read and decode an image file, e.g. a backplate.
pub fn load_image(path: &Path) -> RenderResult<PixelBuffer> {
    let dyn_img =
        image::open(path).with_context(|| format!("read image '{}'", path.display()))?;
    to_pixel_buffer(dyn_img)
}

fn to_pixel_buffer(dyn_img: image::DynamicImage) -> RenderResult<PixelBuffer> {
    let rgba = dyn_img.to_rgba32f();
    let (width, height) = rgba.dimensions();
    let pixels = rgba
        .pixels()
        .map(|p| Rgba32F::new(p[0], p[1], p[2], p[3]))
        .collect();
    PixelBuffer::from_pixels(width, height, pixels)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/decode.rs"]
mod tests;
