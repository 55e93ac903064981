use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::aov::channel::ChannelId;
use crate::aov::depth::DepthNormalization;
use crate::backend::session::{CameraFraming, PostEffect, RenderQuality};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::backplate::BackplateFit;
use crate::render::completion::CompletionCriteriaParams;
use crate::render::composite::CatcherSettings;

/// Tiled rendering switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSettings {
    /// Render production frames tile by tile.
    pub enabled: bool,
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            width: 256,
            height: 256,
        }
    }
}

/// Backplate image shown behind the scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackplateSettings {
    /// Image file. `None` uses the procedural background.
    pub image: Option<PathBuf>,
    /// How the image is fitted to the frame.
    pub fit: BackplateFit,
}

/// Global render settings, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// When a render session is complete.
    pub completion: CompletionCriteriaParams,
    /// Iterations rendered per `render` call.
    pub samples_per_update: u32,
    /// Ramp the iterations per call through 1, 2, 4 .. 32 (interactive sessions).
    pub iteration_ramp: bool,
    /// Channels to render besides colour.
    pub channels: BTreeSet<ChannelId>,
    /// Channel shown to the user. Always rendered.
    pub render_view: ChannelId,
    /// Depth channel normalization.
    pub depth: DepthNormalization,
    /// Render stamp template, see [`crate::aov::stamp::RenderStamp`].
    pub render_stamp: Option<String>,
    /// Post effects attached to the backend resolve step.
    pub post_effects: Vec<PostEffect>,
    /// Prefer denoised colour when the backend has a denoiser.
    pub denoiser: bool,
    /// Shadow and reflection catcher compositing.
    pub catchers: CatcherSettings,
    /// Take colour alpha from the opacity channel.
    pub camera_alpha_mask: bool,
    /// Tiled rendering.
    pub tile: TileSettings,
    /// Backplate image.
    pub backplate: BackplateSettings,
    /// Requested backend quality.
    pub quality: RenderQuality,
    /// Camera framing. `None` keeps the backend's.
    pub camera: Option<CameraFraming>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            completion: CompletionCriteriaParams::default(),
            samples_per_update: 1,
            iteration_ramp: false,
            channels: BTreeSet::from([ChannelId::Color]),
            render_view: ChannelId::Color,
            depth: DepthNormalization::default(),
            render_stamp: None,
            post_effects: Vec::new(),
            denoiser: false,
            catchers: CatcherSettings::default(),
            camera_alpha_mask: false,
            tile: TileSettings::default(),
            backplate: BackplateSettings::default(),
            quality: RenderQuality::default(),
            camera: None,
        }
    }
}

impl RenderSettings {
    /// Parse settings from JSON text. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> RenderResult<Self> {
        serde_json::from_str(s).map_err(|e| RenderError::serde(format!("render settings: {e}")))
    }

    /// Load settings from a JSON file.
    pub fn from_path(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read settings '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Whether channel `id` should be rendered.
    pub fn is_channel_enabled(&self, id: ChannelId) -> bool {
        id == ChannelId::Color || id == self.render_view || self.channels.contains(&id)
    }

    /// Reject settings no render can honour.
    pub fn validate(&self) -> RenderResult<()> {
        self.completion.validate()?;
        if self.samples_per_update == 0 {
            return Err(RenderError::configuration(
                "samples_per_update must be at least 1",
            ));
        }
        if self.tile.width == 0 || self.tile.height == 0 {
            return Err(RenderError::configuration(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile.width, self.tile.height
            )));
        }
        self.catchers.validate()?;
        for effect in &self.post_effects {
            effect.validate()?;
        }
        let d = &self.depth;
        if !d.auto_normalize && (!d.min.is_finite() || !d.max.is_finite() || d.min > d.max) {
            return Err(RenderError::configuration(format!(
                "depth range must be finite with min <= max, got {}..{}",
                d.min, d.max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/context/settings.rs"]
mod tests;
