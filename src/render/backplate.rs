use serde::{Deserialize, Serialize};

use crate::buffer::pixel_buffer::PixelBuffer;
use crate::foundation::core::{RenderRegion, Rgba32F};

/// How a backplate image is fitted to the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackplateFit {
    /// Horizontal fit for landscape images, vertical fit otherwise.
    #[default]
    Best,
    /// Cover the frame on both axes, keeping the aspect ratio and cropping the overflow.
    Fill,
    /// Scale each axis independently to the frame.
    Stretch,
    /// Match the frame width and keep the aspect ratio, centred vertically.
    Horizontal,
    /// Match the frame height and keep the aspect ratio, centred horizontally.
    Vertical,
}

impl BackplateFit {
    fn resolve(self, image_width: u32, image_height: u32) -> Self {
        match self {
            Self::Best if image_width > image_height => Self::Horizontal,
            Self::Best => Self::Vertical,
            other => other,
        }
    }
}

/// Image pixels per frame pixel along x and y.
fn scales(fit: BackplateFit, image: (f32, f32), frame: (f32, f32)) -> (f32, f32) {
    let (iw, ih) = image;
    let (fw, fh) = frame;
    match fit {
        BackplateFit::Stretch => (iw / fw, ih / fh),
        BackplateFit::Fill => {
            let s = (iw / fw).min(ih / fh);
            (s, s)
        }
        BackplateFit::Horizontal => (iw / fw, iw / fw),
        BackplateFit::Vertical | BackplateFit::Best => (ih / fh, ih / fh),
    }
}

/// Cut the part of `image` that lands in `window` of a `frame_width x frame_height` frame.
///
/// The image is fitted to the whole frame and centred, then sampled nearest-neighbour for
/// each window pixel. The result is `window`-sized with top-down rows; pixels outside the
/// frame or the image are transparent. Slicing every tile of a grid this way gives the
/// same backplate as fitting it to the full frame once.
pub fn slice_backplate(
    image: &PixelBuffer,
    fit: BackplateFit,
    frame_width: u32,
    frame_height: u32,
    window: &RenderRegion,
) -> PixelBuffer {
    let (w, h) = (window.width(), window.height());
    let mut out = PixelBuffer::with_size(w, h);
    if image.is_empty() || frame_width == 0 || frame_height == 0 {
        return out;
    }

    let (iw, ih) = (image.width(), image.height());
    let fit = fit.resolve(iw, ih);
    let (fw, fh) = (frame_width as f32, frame_height as f32);
    let (sx, sy) = scales(fit, (iw as f32, ih as f32), (fw, fh));

    let pixels = out.as_mut_slice();
    for row in 0..h {
        let y_up = i64::from(window.top) - i64::from(row);
        if y_up < 0 || y_up >= i64::from(frame_height) {
            continue;
        }
        let frame_row = (i64::from(frame_height) - 1 - y_up) as f32;
        let v = ((frame_row + 0.5 - fh * 0.5) * sy + ih as f32 * 0.5).floor();
        if v < 0.0 || v >= ih as f32 {
            continue;
        }
        for col in 0..w {
            let x = i64::from(window.left) + i64::from(col);
            if x >= i64::from(frame_width) {
                break;
            }
            let u = ((x as f32 + 0.5 - fw * 0.5) * sx + iw as f32 * 0.5).floor();
            if u < 0.0 || u >= iw as f32 {
                continue;
            }
            pixels[(row * w + col) as usize] = image
                .get(u as u32, v as u32)
                .unwrap_or(Rgba32F::TRANSPARENT);
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/backplate.rs"]
mod tests;
