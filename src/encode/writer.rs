use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::buffer::pixel_buffer::PixelBuffer;
use crate::foundation::error::{RenderError, RenderResult};

/// Output image container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// OpenEXR, 32-bit float RGBA.
    #[default]
    Exr,
    /// PNG, 8-bit RGBA.
    Png,
    /// JPEG, 8-bit RGB.
    Jpeg,
    /// TIFF, 8-bit RGBA.
    Tiff,
    /// BMP, 8-bit RGBA.
    Bmp,
    /// Radiance HDR, 32-bit float RGB.
    Hdr,
}

impl ImageFormat {
    /// Parse a file extension, ignoring case and a leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Some(match ext.as_str() {
            "exr" => Self::Exr,
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "tif" | "tiff" => Self::Tiff,
            "bmp" => Self::Bmp,
            "hdr" => Self::Hdr,
            _ => return None,
        })
    }

    /// Format implied by the extension of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Exr => "exr",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Hdr => "hdr",
        }
    }

    /// Whether the container can hold several named layers in one file.
    pub fn supports_layers(self) -> bool {
        matches!(self, Self::Exr)
    }
}

/// How a saved render should be encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFileDescription {
    /// Container format.
    pub format: ImageFormat,
    /// Writer-specific flags, passed through untouched.
    pub flags: u32,
}

impl ImageFileDescription {
    /// Description for `format` with no flags.
    pub fn new(format: ImageFormat) -> Self {
        Self { format, flags: 0 }
    }

    /// Description from the extension of `path`, falling back to EXR.
    pub fn for_path(path: &Path) -> Self {
        Self::new(ImageFormat::from_path(path).unwrap_or_default())
    }
}

/// One named plane of a layered image.
#[derive(Clone, Copy, Debug)]
pub struct ImageLayer<'a> {
    /// Layer name.
    pub name: &'a str,
    /// Top-down pixels.
    pub pixels: &'a PixelBuffer,
}

/// Image writer collaborator. Pixels arrive as top-down linear float RGBA.
pub trait ImageWriter: Send {
    /// Write a single image.
    fn write(&mut self, path: &Path, pixels: &PixelBuffer, format: ImageFormat)
    -> RenderResult<()>;

    /// Write several planes into one file. Writers without layer support return
    /// [`RenderError::Unsupported`] and the caller falls back to one file per plane.
    fn write_layers(
        &mut self,
        path: &Path,
        layers: &[ImageLayer<'_>],
        format: ImageFormat,
    ) -> RenderResult<()> {
        let _ = (layers, format);
        Err(RenderError::unsupported(format!(
            "layered output is not available for '{}'",
            path.display()
        )))
    }
}

/// [`ImageWriter`] backed by the `image` crate encoders.
#[derive(Debug, Default)]
pub struct ImageFileWriter;

impl ImageFileWriter {
    /// Create a writer.
    pub fn new() -> Self {
        Self
    }
}

impl ImageWriter for ImageFileWriter {
    #[tracing::instrument(skip(self, pixels), fields(width = pixels.width(), height = pixels.height()))]
    fn write(
        &mut self,
        path: &Path,
        pixels: &PixelBuffer,
        format: ImageFormat,
    ) -> RenderResult<()> {
        let (w, h) = (pixels.width(), pixels.height());
        if !pixels.is_allocated() || w == 0 || h == 0 {
            return Err(RenderError::invalid_usage(format!(
                "nothing to write to '{}'",
                path.display()
            )));
        }
        let too_big = || RenderError::invalid_usage("pixel data does not match its dimensions");

        let (image, target) = match format {
            ImageFormat::Exr => (
                image::DynamicImage::ImageRgba32F(
                    image::Rgba32FImage::from_raw(w, h, pixels.to_f32_vec()).ok_or_else(too_big)?,
                ),
                image::ImageFormat::OpenExr,
            ),
            ImageFormat::Hdr => {
                let rgb: Vec<f32> = pixels
                    .as_slice()
                    .iter()
                    .flat_map(|p| [p.r, p.g, p.b])
                    .collect();
                (
                    image::DynamicImage::ImageRgb32F(
                        image::Rgb32FImage::from_raw(w, h, rgb).ok_or_else(too_big)?,
                    ),
                    image::ImageFormat::Hdr,
                )
            }
            ImageFormat::Png | ImageFormat::Tiff | ImageFormat::Bmp | ImageFormat::Jpeg => {
                let rgba = image::DynamicImage::ImageRgba8(
                    image::RgbaImage::from_raw(w, h, pixels.to_rgba8()).ok_or_else(too_big)?,
                );
                match format {
                    ImageFormat::Png => (rgba, image::ImageFormat::Png),
                    ImageFormat::Tiff => (rgba, image::ImageFormat::Tiff),
                    ImageFormat::Bmp => (rgba, image::ImageFormat::Bmp),
                    _ => (
                        image::DynamicImage::ImageRgb8(rgba.to_rgb8()),
                        image::ImageFormat::Jpeg,
                    ),
                }
            }
        };
        image
            .save_with_format(path, target)
            .with_context(|| format!("write {format:?} image '{}'", path.display()))?;
        Ok(())
    }
}

/// In-memory writer for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemoryWriter {
    layered: bool,
    files: Vec<(PathBuf, ImageFormat, PixelBuffer)>,
    layer_files: Vec<(PathBuf, Vec<(String, PixelBuffer)>)>,
}

impl InMemoryWriter {
    /// Writer without layer support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that accepts layered output.
    pub fn with_layers() -> Self {
        Self {
            layered: true,
            ..Self::default()
        }
    }

    /// Single-image writes in call order.
    pub fn files(&self) -> &[(PathBuf, ImageFormat, PixelBuffer)] {
        &self.files
    }

    /// Layered writes in call order.
    pub fn layer_files(&self) -> &[(PathBuf, Vec<(String, PixelBuffer)>)] {
        &self.layer_files
    }
}

impl ImageWriter for InMemoryWriter {
    fn write(
        &mut self,
        path: &Path,
        pixels: &PixelBuffer,
        format: ImageFormat,
    ) -> RenderResult<()> {
        self.files
            .push((path.to_path_buf(), format, pixels.clone()));
        Ok(())
    }

    fn write_layers(
        &mut self,
        path: &Path,
        layers: &[ImageLayer<'_>],
        format: ImageFormat,
    ) -> RenderResult<()> {
        if !self.layered || !format.supports_layers() {
            return Err(RenderError::unsupported(format!(
                "in-memory writer has no layered {format:?} output"
            )));
        }
        self.layer_files.push((
            path.to_path_buf(),
            layers
                .iter()
                .map(|l| (l.name.to_string(), l.pixels.clone()))
                .collect(),
        ));
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/writer.rs"]
mod tests;
