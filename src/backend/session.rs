use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::aov::channel::ChannelId;
use crate::buffer::pixel_buffer::PixelBuffer;
use crate::foundation::core::{Outcome, RenderRegion, Rgba32F};
use crate::foundation::error::{RenderError, RenderResult};
use crate::scene::graph::ObjectSnapshot;

/// Device a session should run on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Host CPU.
    Cpu,
    /// GPU by ordinal.
    Gpu(u32),
}

/// Flags used when creating a backend session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationFlags {
    /// Devices to render on. Must not be empty.
    pub devices: Vec<DeviceKind>,
    /// Worker threads for CPU devices. `None` uses the backend default.
    pub threads: Option<usize>,
}

impl Default for CreationFlags {
    fn default() -> Self {
        Self {
            devices: vec![DeviceKind::Cpu],
            threads: None,
        }
    }
}

impl CreationFlags {
    /// Check the flags before any backend work happens.
    pub fn validate(&self) -> RenderResult<()> {
        if self.devices.is_empty() {
            return Err(RenderError::configuration(
                "creation flags select no render device",
            ));
        }
        if self.threads == Some(0) {
            return Err(RenderError::configuration(
                "worker thread count must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Quality levels a backend may offer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderQuality {
    /// Fast preview.
    Low,
    /// Balanced.
    Medium,
    /// High quality.
    High,
    /// Full path tracing.
    #[default]
    Full,
}

/// Which version of a channel to read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelSource {
    /// Accumulated samples plus per-pixel weights.
    Raw,
    /// Normalized with every attached post effect applied.
    Resolved,
}

/// Post effect attached to the backend's resolve step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostEffect {
    /// Colour temperature correction in Kelvin.
    WhiteBalance {
        /// Target temperature.
        temperature: f32,
    },
    /// Exposure plus contrast curve.
    SimpleTonemap {
        /// Exposure in stops.
        exposure: f32,
        /// Contrast exponent.
        contrast: f32,
    },
    /// Photographic tonemap.
    Tonemap {
        /// Scale applied before the curve.
        pre_scale: f32,
        /// Scale applied after the curve.
        post_scale: f32,
        /// Highlight burn.
        burn: f32,
    },
    /// Rescale so the brightest component is at most 1.
    Normalization,
    /// Display gamma.
    GammaCorrection {
        /// Gamma exponent.
        gamma: f32,
    },
}

/// Kind of a [`PostEffect`], without parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PostEffectKind {
    /// See [`PostEffect::WhiteBalance`].
    WhiteBalance,
    /// See [`PostEffect::SimpleTonemap`].
    SimpleTonemap,
    /// See [`PostEffect::Tonemap`].
    Tonemap,
    /// See [`PostEffect::Normalization`].
    Normalization,
    /// See [`PostEffect::GammaCorrection`].
    GammaCorrection,
}

impl PostEffect {
    /// Parameter-free kind.
    pub fn kind(&self) -> PostEffectKind {
        match self {
            Self::WhiteBalance { .. } => PostEffectKind::WhiteBalance,
            Self::SimpleTonemap { .. } => PostEffectKind::SimpleTonemap,
            Self::Tonemap { .. } => PostEffectKind::Tonemap,
            Self::Normalization => PostEffectKind::Normalization,
            Self::GammaCorrection { .. } => PostEffectKind::GammaCorrection,
        }
    }

    /// Reject parameters that cannot produce finite output.
    pub fn validate(&self) -> RenderResult<()> {
        let ok = match *self {
            Self::WhiteBalance { temperature } => temperature.is_finite() && temperature > 0.0,
            Self::SimpleTonemap { exposure, contrast } => {
                exposure.is_finite() && contrast.is_finite() && contrast > 0.0
            }
            Self::Tonemap {
                pre_scale,
                post_scale,
                burn,
            } => pre_scale.is_finite() && post_scale.is_finite() && burn.is_finite() && burn > 0.0,
            Self::Normalization => true,
            Self::GammaCorrection { gamma } => gamma.is_finite() && gamma > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(RenderError::configuration(format!(
                "invalid post effect parameters: {self:?}"
            )))
        }
    }
}

/// Camera projection parameters the tile renderer rescales per tile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Projection {
    /// Pinhole camera with a film back.
    Perspective {
        /// Film back size.
        sensor: [f32; 2],
    },
    /// Parallel projection.
    Orthographic {
        /// View width.
        width: f32,
        /// View height.
        height: f32,
    },
}

/// Framing of the backend camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraFraming {
    /// Projection and its extent.
    pub projection: Projection,
    /// Lens shift in units of the film extent.
    pub lens_shift: [f32; 2],
}

impl Default for CameraFraming {
    fn default() -> Self {
        Self {
            projection: Projection::Perspective {
                sensor: [36.0, 24.0],
            },
            lens_shift: [0.0, 0.0],
        }
    }
}

impl CameraFraming {
    /// Film extent along x and y.
    pub fn extent(&self) -> [f32; 2] {
        match self.projection {
            Projection::Perspective { sensor } => sensor,
            Projection::Orthographic { width, height } => [width, height],
        }
    }
}

/// A whole-frame readback.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBuffer {
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Top-down row-major pixels.
    pub pixels: Vec<Rgba32F>,
    /// Accumulation weight per pixel. `None` means the pixels are already normalized.
    pub weights: Option<Vec<f32>>,
}

/// Cooperative abort flag shared between a render context and its session.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Create a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running render to stop at its next checkpoint.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True while an abort is pending.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Consume a pending abort, returning whether one was pending.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Drop any pending abort.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One live session on a render backend.
///
/// Sessions are owned by exactly one render context and only called while its lock is held.
pub trait BackendSession: Send {
    /// Human-readable renderer name.
    fn name(&self) -> &str;

    /// Reallocate output buffers for a `width x height` frame.
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Restrict rendering to `region`, or render the whole frame for `None`.
    fn set_region(&mut self, region: Option<RenderRegion>) -> RenderResult<()>;

    /// Whether sub-region rendering is available.
    fn supports_region(&self) -> bool {
        true
    }

    /// Whether the backend can produce `id` at all.
    fn supports_channel(&self, id: ChannelId) -> bool;

    /// Attach or detach the output buffer for `id`.
    fn enable_channel(&mut self, id: ChannelId, enabled: bool) -> RenderResult<()>;

    /// Whether an output buffer for `id` is attached.
    fn is_channel_enabled(&self, id: ChannelId) -> bool;

    /// Drop accumulated samples so the next iteration starts a fresh image.
    fn clear_accumulation(&mut self) -> RenderResult<()>;

    /// Render `count` progressive iterations, stopping early when aborted.
    fn render_iterations(&mut self, count: u32) -> RenderResult<Outcome<()>>;

    /// Read the whole frame of channel `id`.
    fn read_channel(&mut self, id: ChannelId, source: ChannelSource) -> RenderResult<RawBuffer>;

    /// Denoised version of channel `id`. Backends without a denoiser return
    /// [`RenderError::Unsupported`].
    fn denoise(&mut self, id: ChannelId) -> RenderResult<RawBuffer> {
        Err(RenderError::unsupported(format!(
            "{} has no denoiser for {id:?}",
            self.name()
        )))
    }

    /// Attach (or detach, when `attached` is false) a post effect.
    fn set_post_effect(&mut self, effect: PostEffect, attached: bool) -> RenderResult<()>;

    /// Select a quality level.
    fn set_render_quality(&mut self, quality: RenderQuality) -> RenderResult<()>;

    /// Bytes of device memory currently in use.
    fn memory_usage(&self) -> u64;

    /// Create or replace the backend object for `key`.
    fn upsert_object(&mut self, key: &str, snapshot: &ObjectSnapshot) -> RenderResult<()>;

    /// Remove the backend object for `key`. Unknown keys are ignored.
    fn remove_object(&mut self, key: &str) -> RenderResult<()>;

    /// Keys of every backend object.
    fn object_keys(&self) -> Vec<String>;

    /// Current camera framing.
    fn camera_framing(&self) -> CameraFraming;

    /// Replace the camera framing.
    fn set_camera_framing(&mut self, framing: CameraFraming) -> RenderResult<()>;

    /// Set or clear the background plate, sized to the current frame.
    fn set_background_image(&mut self, image: Option<PixelBuffer>) -> RenderResult<()>;

    /// Whether shader compilation has already happened for this session.
    fn shaders_cached(&self) -> bool {
        true
    }

    /// Whether resolved colour is already premultiplied by opacity.
    fn premultiplied_output(&self) -> bool {
        false
    }
}

/// Factory for backend sessions.
pub trait RenderBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Open a session. `abort` is raised by the owning context to stop a running render.
    fn create_session(
        &self,
        flags: &CreationFlags,
        abort: AbortSignal,
    ) -> RenderResult<Box<dyn BackendSession>>;
}

#[cfg(test)]
#[path = "../../tests/unit/backend/session.rs"]
mod tests;
