use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::aov::channel::ChannelId;
use crate::backend::session::{
    AbortSignal, BackendSession, CameraFraming, ChannelSource, CreationFlags, PostEffect,
    PostEffectKind, RawBuffer, RenderBackend, RenderQuality,
};
use crate::buffer::pixel_buffer::PixelBuffer;
use crate::foundation::core::{Outcome, RenderRegion, Rgba32F};
use crate::foundation::error::{RenderError, RenderResult};
use crate::scene::graph::ObjectSnapshot;

/// Knobs of the CPU reference backend.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuBackendOpts {
    /// Largest frame, in pixels, a session accepts before reporting resource exhaustion.
    pub max_pixels: u64,
    /// Offer a box-filter denoiser for the colour channel.
    pub denoiser: bool,
    /// Report resolved colour as already premultiplied.
    pub premultiplied: bool,
    /// Quality levels the backend accepts.
    pub qualities: Vec<RenderQuality>,
    /// Channels the backend cannot produce.
    pub unsupported_channels: Vec<ChannelId>,
    /// Whether sub-region rendering is offered.
    pub region_support: bool,
}

impl Default for CpuBackendOpts {
    fn default() -> Self {
        Self {
            max_pixels: 4096 * 4096,
            denoiser: false,
            premultiplied: false,
            qualities: vec![
                RenderQuality::Low,
                RenderQuality::Medium,
                RenderQuality::High,
                RenderQuality::Full,
            ],
            unsupported_channels: Vec::new(),
            region_support: true,
        }
    }
}

/// Deterministic procedural renderer running on a rayon pool.
///
/// Scene objects are flat discs placed in film coordinates. Every sample of a pixel shades the
/// same value, so progressive accumulation converges immediately and a tiled render matches a
/// full-frame one.
#[derive(Clone, Debug, Default)]
pub struct CpuBackend {
    opts: CpuBackendOpts,
}

impl CpuBackend {
    /// Backend with the given options.
    pub fn new(opts: CpuBackendOpts) -> Self {
        Self { opts }
    }

    /// Options sessions are created with.
    pub fn opts(&self) -> &CpuBackendOpts {
        &self.opts
    }
}

impl RenderBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    #[tracing::instrument(skip(self, abort))]
    fn create_session(
        &self,
        flags: &CreationFlags,
        abort: AbortSignal,
    ) -> RenderResult<Box<dyn BackendSession>> {
        flags.validate()?;
        let pool = build_thread_pool(flags.threads)?;
        tracing::debug!(threads = pool.current_num_threads(), "cpu session created");
        Ok(Box::new(CpuSession::new(self.opts.clone(), pool, abort)))
    }
}

fn build_thread_pool(threads: Option<usize>) -> RenderResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| RenderError::backend(format!("failed to build rayon thread pool: {e}")))
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Disc {
    center: [f32; 2],
    radius: f32,
    color: [f32; 3],
    depth: f32,
    shadow_catcher: bool,
    reflection_catcher: bool,
    group: f32,
    material: f32,
}

impl Disc {
    fn from_snapshot(key: &str, snapshot: &ObjectSnapshot) -> RenderResult<Self> {
        let f = |name: &str, default: f64| {
            snapshot
                .get(name)
                .and_then(|v| v.as_f64())
                .unwrap_or(default) as f32
        };
        let b = |name: &str| snapshot.get(name).and_then(|v| v.as_bool()).unwrap_or(false);
        let center = snapshot
            .get("position")
            .and_then(|v| v.as_vec2())
            .map_or([0.0, 0.0], |p| [p[0] as f32, p[1] as f32]);
        let disc = Self {
            center,
            radius: f("radius", 1.0),
            color: snapshot
                .get("color")
                .and_then(|v| v.as_color())
                .unwrap_or([0.8, 0.8, 0.8]),
            depth: f("depth", 10.0),
            shadow_catcher: b("shadow_catcher"),
            reflection_catcher: b("reflection_catcher"),
            group: f("group", 0.0),
            material: f("material", 0.0),
        };
        if !disc.radius.is_finite() || disc.radius < 0.0 || !disc.depth.is_finite() {
            return Err(RenderError::backend(format!(
                "object '{key}' has invalid geometry: radius={} depth={}",
                disc.radius, disc.depth
            )));
        }
        Ok(disc)
    }

    fn is_catcher(&self) -> bool {
        self.shadow_catcher || self.reflection_catcher
    }

    fn offset(&self, x: f32, y: f32) -> Option<[f32; 2]> {
        let d = [x - self.center[0], y - self.center[1]];
        (self.radius > 0.0 && d[0] * d[0] + d[1] * d[1] <= self.radius * self.radius)
            .then_some(d)
    }
}

/// One session of the [`CpuBackend`].
pub struct CpuSession {
    opts: CpuBackendOpts,
    pool: rayon::ThreadPool,
    abort: AbortSignal,
    width: u32,
    height: u32,
    region: Option<RenderRegion>,
    accum: BTreeMap<ChannelId, Vec<Rgba32F>>,
    weights: Vec<f32>,
    objects: BTreeMap<String, Disc>,
    framing: CameraFraming,
    background: Option<PixelBuffer>,
    effects: BTreeMap<PostEffectKind, PostEffect>,
    quality: RenderQuality,
    shaders_cached: bool,
}

impl std::fmt::Debug for CpuSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuSession")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("region", &self.region)
            .field("channels", &self.accum.keys().collect::<Vec<_>>())
            .field("objects", &self.objects.len())
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl CpuSession {
    fn new(opts: CpuBackendOpts, pool: rayon::ThreadPool, abort: AbortSignal) -> Self {
        Self {
            opts,
            pool,
            abort,
            width: 0,
            height: 0,
            region: None,
            accum: BTreeMap::new(),
            weights: Vec::new(),
            objects: BTreeMap::new(),
            framing: CameraFraming::default(),
            background: None,
            effects: BTreeMap::new(),
            quality: RenderQuality::default(),
            shaders_cached: false,
        }
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn require_enabled(&self, id: ChannelId) -> RenderResult<&Vec<Rgba32F>> {
        self.accum.get(&id).ok_or_else(|| {
            RenderError::invalid_usage(format!("channel {id:?} is not enabled on the cpu session"))
        })
    }

    fn normalized(&self, id: ChannelId) -> RenderResult<Vec<Rgba32F>> {
        let acc = self.require_enabled(id)?;
        Ok(acc
            .iter()
            .zip(&self.weights)
            .map(|(px, w)| {
                if *w > 0.0 {
                    px.scale(1.0 / *w)
                } else {
                    Rgba32F::TRANSPARENT
                }
            })
            .collect())
    }

    fn resolve_effects(&self, pixels: &mut [Rgba32F]) {
        for effect in self.effects.values() {
            for px in pixels.iter_mut() {
                let [r, g, b] = apply_effect(effect, [px.r, px.g, px.b]);
                px.r = r;
                px.g = g;
                px.b = b;
            }
        }
    }
}

fn apply_effect(effect: &PostEffect, rgb: [f32; 3]) -> [f32; 3] {
    match *effect {
        PostEffect::WhiteBalance { temperature } => {
            let k = (6500.0 / temperature).sqrt();
            [rgb[0] * k, rgb[1], rgb[2] / k]
        }
        PostEffect::SimpleTonemap { exposure, contrast } => {
            let gain = exposure.exp2();
            rgb.map(|c| (c.max(0.0) * gain).powf(contrast))
        }
        PostEffect::Tonemap {
            pre_scale,
            post_scale,
            burn,
        } => rgb.map(|c| {
            let x = c.max(0.0) * pre_scale;
            post_scale * x * (1.0 + x / (burn * burn)) / (1.0 + x)
        }),
        PostEffect::Normalization => {
            let m = rgb[0].max(rgb[1]).max(rgb[2]);
            if m > 1.0 { rgb.map(|c| c / m) } else { rgb }
        }
        PostEffect::GammaCorrection { gamma } => rgb.map(|c| c.max(0.0).powf(1.0 / gamma)),
    }
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

struct Shader<'a> {
    discs: &'a [Disc],
    framing: CameraFraming,
    width: u32,
    height: u32,
    background: Option<&'a PixelBuffer>,
}

impl Shader<'_> {
    fn background_at(&self, px: u32, py: u32, fx: f32, fy: f32) -> Rgba32F {
        if let Some(img) = self.background
            && img.width() > 0
            && img.height() > 0
        {
            let bx = (u64::from(px) * u64::from(img.width()) / u64::from(self.width)) as u32;
            let by = (u64::from(py) * u64::from(img.height()) / u64::from(self.height)) as u32;
            if let Some(p) = img.get(bx, by) {
                return p;
            }
        }
        let [ex, ey] = self.framing.extent();
        Rgba32F::opaque([clamp01(0.5 + fx / ex), clamp01(0.5 + fy / ey), 0.25])
    }

    /// Every channel's value for the pixel at column `px`, top-down row `py`.
    fn shade(&self, px: u32, py: u32) -> [Rgba32F; ChannelId::COUNT] {
        let [ex, ey] = self.framing.extent();
        let [sx, sy] = self.framing.lens_shift;
        let yb = self.height - 1 - py;
        let fx = ((px as f32 + 0.5) / self.width as f32 - 0.5 + sx) * ex;
        let fy = ((yb as f32 + 0.5) / self.height as f32 - 0.5 + sy) * ey;

        let bg = self.background_at(px, py, fx, fy);
        let mut out = [Rgba32F::TRANSPARENT; ChannelId::COUNT];
        out[ChannelId::Background.index() as usize] = Rgba32F::new(bg.r, bg.g, bg.b, 1.0);

        let hit = self
            .discs
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_catcher())
            .filter_map(|(i, d)| d.offset(fx, fy).map(|o| (i, d, o)))
            .min_by(|a, b| a.1.depth.total_cmp(&b.1.depth));

        let Some((index, disc, [dx, dy])) = hit else {
            out[ChannelId::Color.index() as usize] = Rgba32F::new(bg.r, bg.g, bg.b, 1.0);
            out[ChannelId::Opacity.index() as usize] = Rgba32F::BLACK;
            self.shade_catchers(fx, fy, &mut out);
            return out;
        };

        let (nx, ny) = (dx / disc.radius, dy / disc.radius);
        let nz = (1.0 - nx * nx - ny * ny).max(0.0).sqrt();
        let id = (index + 1) as f32;
        let set = |out: &mut [Rgba32F; ChannelId::COUNT], ch: ChannelId, v: Rgba32F| {
            out[ch.index() as usize] = v;
        };
        set(&mut out, ChannelId::Color, Rgba32F::opaque(disc.color));
        set(&mut out, ChannelId::Opacity, Rgba32F::WHITE);
        set(
            &mut out,
            ChannelId::WorldCoordinate,
            Rgba32F::new(fx, fy, disc.depth, 1.0),
        );
        set(
            &mut out,
            ChannelId::Uv,
            Rgba32F::new((nx + 1.0) * 0.5, (ny + 1.0) * 0.5, 0.0, 1.0),
        );
        set(
            &mut out,
            ChannelId::MaterialIndex,
            Rgba32F::opaque([disc.material; 3]),
        );
        set(&mut out, ChannelId::GeometricNormal, Rgba32F::new(nx, ny, nz, 1.0));
        set(&mut out, ChannelId::ShadingNormal, Rgba32F::new(nx, ny, nz, 1.0));
        set(&mut out, ChannelId::Depth, Rgba32F::opaque([disc.depth; 3]));
        set(&mut out, ChannelId::ObjectId, Rgba32F::opaque([id; 3]));
        set(&mut out, ChannelId::ObjectGroupId, Rgba32F::opaque([disc.group; 3]));
        out
    }

    fn shade_catchers(&self, fx: f32, fy: f32, out: &mut [Rgba32F; ChannelId::COUNT]) {
        let casters = || self.discs.iter().filter(|d| !d.is_catcher());
        let on_shadow_catcher = self
            .discs
            .iter()
            .any(|d| d.shadow_catcher && d.offset(fx, fy).is_some());
        if on_shadow_catcher {
            let shadowed = casters().any(|d| {
                d.offset(fx - 0.25 * d.radius, fy + 0.5 * d.radius)
                    .is_some()
            });
            let v = if shadowed { 1.0 } else { 0.0 };
            out[ChannelId::ShadowCatcher.index() as usize] = Rgba32F::opaque([v; 3]);
        }
        if let Some(mirror) = self
            .discs
            .iter()
            .find(|d| d.reflection_catcher && d.offset(fx, fy).is_some())
        {
            let my = 2.0 * mirror.center[1] - fy;
            let reflected = casters()
                .filter(|d| d.offset(fx, my).is_some())
                .min_by(|a, b| a.depth.total_cmp(&b.depth));
            if let Some(d) = reflected {
                out[ChannelId::ReflectionCatcher.index() as usize] =
                    Rgba32F::opaque(d.color.map(|c| c * 0.5));
            }
        }
    }
}

impl BackendSession for CpuSession {
    fn name(&self) -> &str {
        "cpu"
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let count = u64::from(width) * u64::from(height);
        if count > self.opts.max_pixels {
            return Err(RenderError::resource_exhausted(format!(
                "{width}x{height} frame exceeds the {} pixel limit",
                self.opts.max_pixels
            )));
        }
        self.width = width;
        self.height = height;
        let n = self.pixel_count();
        for acc in self.accum.values_mut() {
            *acc = vec![Rgba32F::TRANSPARENT; n];
        }
        self.weights = vec![0.0; n];
        if let Some(r) = self.region
            && !r.fits_within(width, height)
        {
            self.region = None;
        }
        Ok(())
    }

    fn set_region(&mut self, region: Option<RenderRegion>) -> RenderResult<()> {
        if region.is_some() && !self.opts.region_support {
            return Err(RenderError::unsupported("cpu session has region rendering disabled"));
        }
        if let Some(r) = region
            && !r.fits_within(self.width, self.height)
        {
            return Err(RenderError::invalid_usage(format!(
                "region {r:?} exceeds {}x{} frame",
                self.width, self.height
            )));
        }
        self.region = region;
        Ok(())
    }

    fn supports_region(&self) -> bool {
        self.opts.region_support
    }

    fn supports_channel(&self, id: ChannelId) -> bool {
        !self.opts.unsupported_channels.contains(&id)
    }

    fn enable_channel(&mut self, id: ChannelId, enabled: bool) -> RenderResult<()> {
        if !enabled {
            self.accum.remove(&id);
            return Ok(());
        }
        if !self.supports_channel(id) {
            return Err(RenderError::unsupported(format!(
                "cpu session cannot produce {id:?}"
            )));
        }
        let n = self.pixel_count();
        self.accum
            .entry(id)
            .or_insert_with(|| vec![Rgba32F::TRANSPARENT; n]);
        Ok(())
    }

    fn is_channel_enabled(&self, id: ChannelId) -> bool {
        self.accum.contains_key(&id)
    }

    fn clear_accumulation(&mut self) -> RenderResult<()> {
        for acc in self.accum.values_mut() {
            acc.fill(Rgba32F::TRANSPARENT);
        }
        self.weights.fill(0.0);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(width = self.width, height = self.height))]
    fn render_iterations(&mut self, count: u32) -> RenderResult<Outcome<()>> {
        if self.abort.take() {
            return Ok(Outcome::Aborted);
        }
        if count == 0 || self.pixel_count() == 0 {
            return Ok(Outcome::Finished(()));
        }

        let ids: Vec<ChannelId> = self.accum.keys().copied().collect();
        let discs: Vec<Disc> = self.objects.values().copied().collect();
        let (w, h) = (self.width, self.height);
        let region = self.region;
        let stride = ids.len().max(1) * w as usize;
        let mut staged = vec![Rgba32F::TRANSPARENT; stride * h as usize];
        let shader = Shader {
            discs: &discs,
            framing: self.framing,
            width: w,
            height: h,
            background: self.background.as_ref(),
        };
        let abort = &self.abort;

        self.pool.install(|| {
            staged
                .par_chunks_mut(stride)
                .enumerate()
                .for_each(|(py, row)| {
                    if abort.is_raised() {
                        return;
                    }
                    let py = py as u32;
                    let yb = (h - 1 - py) as i32;
                    for px in 0..w {
                        if region.is_some_and(|r| !r.contains(px as i32, yb)) {
                            continue;
                        }
                        let values = shader.shade(px, py);
                        for (k, id) in ids.iter().enumerate() {
                            row[px as usize * ids.len() + k] = values[id.index() as usize];
                        }
                    }
                });
        });

        if self.abort.take() {
            tracing::debug!("render pass aborted, partial samples discarded");
            return Ok(Outcome::Aborted);
        }

        let n = count as f32;
        let stride_px = ids.len();
        for py in 0..h {
            let yb = (h - 1 - py) as i32;
            for px in 0..w {
                if region.is_some_and(|r| !r.contains(px as i32, yb)) {
                    continue;
                }
                let p = py as usize * w as usize + px as usize;
                for (k, id) in ids.iter().enumerate() {
                    if let Some(acc) = self.accum.get_mut(id) {
                        acc[p] = acc[p].add(staged[p * stride_px + k].scale(n));
                    }
                }
                self.weights[p] += n;
            }
        }
        self.shaders_cached = true;
        Ok(Outcome::Finished(()))
    }

    fn read_channel(&mut self, id: ChannelId, source: ChannelSource) -> RenderResult<RawBuffer> {
        let (width, height) = (self.width, self.height);
        match source {
            ChannelSource::Raw => Ok(RawBuffer {
                width,
                height,
                pixels: self.require_enabled(id)?.clone(),
                weights: Some(self.weights.clone()),
            }),
            ChannelSource::Resolved => {
                let mut pixels = self.normalized(id)?;
                if id == ChannelId::Color {
                    self.resolve_effects(&mut pixels);
                }
                Ok(RawBuffer {
                    width,
                    height,
                    pixels,
                    weights: None,
                })
            }
        }
    }

    fn denoise(&mut self, id: ChannelId) -> RenderResult<RawBuffer> {
        if !self.opts.denoiser || id != ChannelId::Color {
            return Err(RenderError::unsupported(format!(
                "cpu session has no denoiser for {id:?}"
            )));
        }
        let src = self.normalized(id)?;
        let (w, h) = (self.width as i64, self.height as i64);
        let mut pixels = vec![Rgba32F::TRANSPARENT; src.len()];
        for y in 0..h {
            for x in 0..w {
                let mut sum = Rgba32F::TRANSPARENT;
                let mut n = 0.0f32;
                for (nx, ny) in (-1..=1).flat_map(|dy| (-1..=1).map(move |dx| (x + dx, y + dy))) {
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let q = (ny * w + nx) as usize;
                    if self.weights[q] > 0.0 {
                        sum = sum.add(src[q]);
                        n += 1.0;
                    }
                }
                if n > 0.0 {
                    pixels[(y * w + x) as usize] = sum.scale(1.0 / n);
                }
            }
        }
        Ok(RawBuffer {
            width: self.width,
            height: self.height,
            pixels,
            weights: None,
        })
    }

    fn set_post_effect(&mut self, effect: PostEffect, attached: bool) -> RenderResult<()> {
        effect.validate()?;
        if attached {
            self.effects.insert(effect.kind(), effect);
        } else {
            self.effects.remove(&effect.kind());
        }
        Ok(())
    }

    fn set_render_quality(&mut self, quality: RenderQuality) -> RenderResult<()> {
        if !self.opts.qualities.contains(&quality) {
            return Err(RenderError::configuration(format!(
                "cpu session does not offer {quality:?} quality"
            )));
        }
        self.quality = quality;
        Ok(())
    }

    fn memory_usage(&self) -> u64 {
        let px = std::mem::size_of::<Rgba32F>() as u64;
        let planes: u64 = self.accum.values().map(|a| a.len() as u64 * px).sum();
        let bg = self.background.as_ref().map_or(0, |b| b.len() as u64 * px);
        planes + self.weights.len() as u64 * 4 + bg
    }

    fn upsert_object(&mut self, key: &str, snapshot: &ObjectSnapshot) -> RenderResult<()> {
        let disc = Disc::from_snapshot(key, snapshot)?;
        self.objects.insert(key.to_string(), disc);
        Ok(())
    }

    fn remove_object(&mut self, key: &str) -> RenderResult<()> {
        self.objects.remove(key);
        Ok(())
    }

    fn object_keys(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    fn camera_framing(&self) -> CameraFraming {
        self.framing
    }

    fn set_camera_framing(&mut self, framing: CameraFraming) -> RenderResult<()> {
        let [ex, ey] = framing.extent();
        if !(ex.is_finite() && ey.is_finite() && ex > 0.0 && ey > 0.0) {
            return Err(RenderError::invalid_usage(format!(
                "camera extent must be positive, got {ex}x{ey}"
            )));
        }
        self.framing = framing;
        Ok(())
    }

    fn set_background_image(&mut self, image: Option<PixelBuffer>) -> RenderResult<()> {
        self.background = image.filter(PixelBuffer::is_allocated);
        Ok(())
    }

    fn shaders_cached(&self) -> bool {
        self.shaders_cached
    }

    fn premultiplied_output(&self) -> bool {
        self.opts.premultiplied
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/cpu.rs"]
mod tests;
