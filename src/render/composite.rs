use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::foundation::core::{RenderRegion, Rgba32F};
use crate::foundation::error::{RenderError, RenderResult};

/// Shadow and reflection catcher compositing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatcherSettings {
    /// Composite the shadow catcher.
    pub shadow: bool,
    /// Composite the reflection catcher.
    pub reflection: bool,
    /// Tint of caught shadows.
    pub shadow_color: [f32; 3],
    /// Shadow transparency.
    pub shadow_transparency: f32,
    /// Shadow weight.
    pub shadow_weight: f32,
    /// Backdrop tint.
    pub background_color: [f32; 3],
    /// Backdrop transparency.
    pub background_transparency: f32,
    /// Backdrop weight.
    pub background_weight: f32,
}

impl Default for CatcherSettings {
    fn default() -> Self {
        Self {
            shadow: false,
            reflection: false,
            shadow_color: [0.0, 0.0, 0.0],
            shadow_transparency: 0.0,
            shadow_weight: 1.0,
            background_color: [1.0, 1.0, 1.0],
            background_transparency: 0.0,
            background_weight: 1.0,
        }
    }
}

/// Which blend law applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatcherMode {
    /// Shadows darken the backdrop.
    Shadow,
    /// Reflections add over the backdrop.
    Reflection,
    /// Both at once.
    ShadowReflection,
}

impl CatcherSettings {
    /// Blend law selected by the flags, if any.
    pub fn mode(&self) -> Option<CatcherMode> {
        match (self.shadow, self.reflection) {
            (true, true) => Some(CatcherMode::ShadowReflection),
            (true, false) => Some(CatcherMode::Shadow),
            (false, true) => Some(CatcherMode::Reflection),
            (false, false) => None,
        }
    }

    /// Reject non-finite or negative weights.
    pub fn validate(&self) -> RenderResult<()> {
        let scalars = [
            self.shadow_transparency,
            self.shadow_weight,
            self.background_transparency,
            self.background_weight,
        ];
        if scalars.iter().any(|v| !v.is_finite() || *v < 0.0)
            || self
                .shadow_color
                .iter()
                .chain(self.background_color.iter())
                .any(|v| !v.is_finite())
        {
            return Err(RenderError::configuration(format!(
                "catcher parameters must be finite and non-negative: {self:?}"
            )));
        }
        Ok(())
    }
}

/// Channel planes feeding a catcher composite. All slices share one frame size.
#[derive(Clone, Copy, Debug)]
pub struct CatcherInputs<'a> {
    /// Beauty pass.
    pub color: &'a [Rgba32F],
    /// Coverage.
    pub opacity: &'a [Rgba32F],
    /// Backdrop.
    pub background: &'a [Rgba32F],
    /// Shadow catcher plane, required for shadow modes.
    pub shadow: Option<&'a [Rgba32F]>,
    /// Reflection catcher plane, required for reflection modes.
    pub reflection: Option<&'a [Rgba32F]>,
}

fn rgb(p: &Rgba32F) -> [f32; 3] {
    [p.r, p.g, p.b]
}

/// Composite the catchers over the backdrop into `out`. Output alpha is 1.
pub fn composite_catchers(
    mode: CatcherMode,
    inputs: &CatcherInputs<'_>,
    settings: &CatcherSettings,
    out: &mut [Rgba32F],
) -> RenderResult<()> {
    let n = out.len();
    let needs_shadow = matches!(mode, CatcherMode::Shadow | CatcherMode::ShadowReflection);
    let needs_reflection = matches!(
        mode,
        CatcherMode::Reflection | CatcherMode::ShadowReflection
    );
    let shadow = if needs_shadow { inputs.shadow } else { Some(inputs.color) };
    let reflection = if needs_reflection {
        inputs.reflection
    } else {
        Some(inputs.color)
    };
    let (Some(shadow), Some(reflection)) = (shadow, reflection) else {
        return Err(RenderError::invalid_usage(format!(
            "{mode:?} compositing is missing a catcher plane"
        )));
    };
    if [
        inputs.color.len(),
        inputs.opacity.len(),
        inputs.background.len(),
        shadow.len(),
        reflection.len(),
    ]
    .iter()
    .any(|len| *len != n)
    {
        return Err(RenderError::invalid_usage(
            "catcher planes differ in size from the output",
        ));
    }

    let bg_scale = settings.background_weight - settings.background_transparency;
    let st = settings.shadow_weight - settings.shadow_transparency;

    out.par_iter_mut().enumerate().for_each(|(i, dst)| {
        let color = rgb(&inputs.color[i]);
        let op = rgb(&inputs.opacity[i]);
        let bg = rgb(&inputs.background[i]);
        let sc = rgb(&shadow[i]);
        let rc = rgb(&reflection[i]);
        let mut res = [0.0f32; 3];
        for c in 0..3 {
            let backdrop = bg[c] * bg_scale * settings.background_color[c];
            let shadow_cover =
                1.0 - (op[c] + sc[c] * st * (1.0 - settings.shadow_color[c])).min(1.0);
            res[c] = match mode {
                CatcherMode::Shadow => backdrop * shadow_cover + color[c] * op[c],
                CatcherMode::Reflection => backdrop * (1.0 - op[c]) + color[c] * (op[c] + rc[c]),
                CatcherMode::ShadowReflection => {
                    backdrop * shadow_cover + color[c] * (op[c] + rc[c])
                }
            };
        }
        *dst = Rgba32F::new(res[0], res[1], res[2], 1.0);
    });
    Ok(())
}

/// Set alpha from the opacity plane's red channel, or to 1 when there is no opacity plane.
///
/// With `premultiply`, colour is scaled by the new alpha as well.
pub fn merge_opacity(pixels: &mut [Rgba32F], opacity: Option<&[Rgba32F]>, premultiply: bool) {
    for (i, px) in pixels.iter_mut().enumerate() {
        let alpha = opacity.and_then(|o| o.get(i)).map_or(1.0, |o| o.r);
        px.a = alpha;
        if premultiply {
            px.r *= alpha;
            px.g *= alpha;
            px.b *= alpha;
        }
    }
}

/// Divide accumulated samples by their weights. Zero-weight pixels become 0.
pub fn normalize_pixels(pixels: &mut [Rgba32F], weights: &[f32]) {
    for (px, w) in pixels.iter_mut().zip(weights) {
        *px = if *w > 0.0 {
            px.scale(1.0 / *w)
        } else {
            Rgba32F::TRANSPARENT
        };
    }
}

/// Copy `region` out of a top-down `src_w x src_h` frame into `dest`.
///
/// Without `flip` the region's top row lands in `dest` row 0; with `flip` its bottom row
/// does.
pub fn copy_region(
    dest: &mut [Rgba32F],
    src: &[Rgba32F],
    src_w: u32,
    src_h: u32,
    region: &RenderRegion,
    flip: bool,
) -> RenderResult<()> {
    if !region.fits_within(src_w, src_h) {
        return Err(RenderError::invalid_usage(format!(
            "region {region:?} exceeds {src_w}x{src_h} source"
        )));
    }
    let w = region.width() as usize;
    let h = region.height() as usize;
    if dest.len() < w * h || src.len() < src_w as usize * src_h as usize {
        return Err(RenderError::invalid_usage(
            "copy buffers are smaller than the region",
        ));
    }
    let src_w = src_w as usize;
    let src_h = src_h as i64;
    for y in 0..h as i64 {
        let row = if flip {
            src_h - (i64::from(region.bottom) + y) - 1
        } else {
            src_h - (i64::from(region.top) - y) - 1
        } as usize;
        let start = row * src_w + region.left as usize;
        let yd = y as usize;
        dest[yd * w..(yd + 1) * w].copy_from_slice(&src[start..start + w]);
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
