use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::aov::depth::DepthNormalization;
use crate::aov::stamp::{RenderStamp, StampInfo};
use crate::backend::session::BackendSession;
use crate::buffer::pixel_buffer::PixelBuffer;
use crate::encode::writer::{ImageFormat, ImageWriter};
use crate::foundation::core::RenderRegion;
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::framebuffer::{FrameBufferPipeline, ReadRequest};

/// Every output kind the orchestrator knows about, in catalogue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    /// Beauty pass.
    Color,
    /// Coverage.
    Opacity,
    /// World-space hit position.
    WorldCoordinate,
    /// Surface parameterization.
    Uv,
    /// Material index.
    MaterialIndex,
    /// Geometric normal.
    GeometricNormal,
    /// Shading normal.
    ShadingNormal,
    /// Camera depth.
    Depth,
    /// Per-object id.
    ObjectId,
    /// Per-group id.
    ObjectGroupId,
    /// Shadow-catcher mask.
    ShadowCatcher,
    /// Background only.
    Background,
    /// Reflection-catcher mask.
    ReflectionCatcher,
}

/// Static naming of a [`ChannelId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelDescriptor {
    /// Settings attribute name.
    pub attribute: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Folder used when each channel is written to its own file.
    pub folder: &'static str,
}

impl ChannelId {
    /// Number of catalogued channels.
    pub const COUNT: usize = 13;

    /// Every channel, in catalogue order.
    pub const ALL: [ChannelId; Self::COUNT] = [
        Self::Color,
        Self::Opacity,
        Self::WorldCoordinate,
        Self::Uv,
        Self::MaterialIndex,
        Self::GeometricNormal,
        Self::ShadingNormal,
        Self::Depth,
        Self::ObjectId,
        Self::ObjectGroupId,
        Self::ShadowCatcher,
        Self::Background,
        Self::ReflectionCatcher,
    ];

    /// Stable numeric id.
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Inverse of [`ChannelId::index`].
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Attribute, display name and folder.
    pub fn descriptor(self) -> ChannelDescriptor {
        let (attribute, name, folder) = match self {
            Self::Color => ("aovColor", "Color", "color"),
            Self::Opacity => ("aovOpacity", "Opacity", "opacity"),
            Self::WorldCoordinate => (
                "aovWorldCoordinate",
                "World Coordinate",
                "world_coordinate",
            ),
            Self::Uv => ("aovUV", "UV", "uv"),
            Self::MaterialIndex => ("aovMaterialIndex", "Material Index", "material_index"),
            Self::GeometricNormal => (
                "aovGeometricNormal",
                "Geometric Normal",
                "geometric_normal",
            ),
            Self::ShadingNormal => ("aovShadingNormal", "Shading Normal", "shading_normal"),
            Self::Depth => ("aovDepth", "Depth", "depth"),
            Self::ObjectId => ("aovObjectId", "Object ID", "object_id"),
            Self::ObjectGroupId => ("aovObjectGroupId", "Object Group ID", "object_group_id"),
            Self::ShadowCatcher => ("aovShadowCatcher", "Shadow", "shadow"),
            Self::Background => ("aovBackground", "Background", "background"),
            Self::ReflectionCatcher => (
                "aovReflectionCatcher",
                "Reflection Catcher",
                "reflection_catcher",
            ),
        };
        ChannelDescriptor {
            attribute,
            name,
            folder,
        }
    }

    /// Look a channel up by attribute, display name or folder, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| {
            let d = id.descriptor();
            [d.attribute, d.name, d.folder]
                .iter()
                .any(|n| n.eq_ignore_ascii_case(s))
        })
    }
}

/// Channel-specific pixel pass run after every readback.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ChannelPostProcess {
    /// Leave pixels as read.
    #[default]
    None,
    /// Depth remapping.
    Depth(DepthNormalization),
}

impl ChannelPostProcess {
    fn apply(&self, pixels: &mut PixelBuffer) {
        match self {
            Self::None => {}
            Self::Depth(n) => n.apply(pixels.as_mut_slice()),
        }
    }
}

/// One render output plane and its pixel storage.
///
/// Pixels are only held while the channel is active and its region has a non-zero area.
#[derive(Clone, Debug)]
pub struct OutputChannel {
    id: ChannelId,
    active: bool,
    region: RenderRegion,
    frame_width: u32,
    frame_height: u32,
    pixels: PixelBuffer,
    post_process: ChannelPostProcess,
    stamp_template: Option<String>,
    stamp: Option<RenderStamp>,
}

impl OutputChannel {
    /// Create an inactive channel.
    pub fn new(id: ChannelId) -> Self {
        let post_process = match id {
            ChannelId::Depth => ChannelPostProcess::Depth(DepthNormalization::default()),
            _ => ChannelPostProcess::None,
        };
        Self {
            id,
            active: false,
            region: RenderRegion::EMPTY,
            frame_width: 0,
            frame_height: 0,
            pixels: PixelBuffer::new(),
            post_process,
            stamp_template: None,
            stamp: None,
        }
    }

    /// Channel identity.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Naming of this channel.
    pub fn descriptor(&self) -> ChannelDescriptor {
        self.id.descriptor()
    }

    /// Whether the channel is rendered and read back.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Activate or deactivate. Deactivation releases the pixels.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.free_pixels();
        }
    }

    /// Region the pixels cover.
    pub fn region(&self) -> RenderRegion {
        self.region
    }

    /// Full frame size the region lives in.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    /// Set the covered region and the frame it belongs to. Pixels are not reallocated.
    pub fn set_region(&mut self, region: RenderRegion, frame_width: u32, frame_height: u32) {
        self.region = region;
        self.frame_width = frame_width;
        self.frame_height = frame_height;
    }

    /// Pixels, when allocated.
    pub fn pixels(&self) -> Option<&PixelBuffer> {
        self.pixels.is_allocated().then_some(&self.pixels)
    }

    /// True when pixels are held.
    pub fn is_allocated(&self) -> bool {
        self.pixels.is_allocated()
    }

    /// Current post-process.
    pub fn post_process(&self) -> ChannelPostProcess {
        self.post_process
    }

    /// Replace the post-process.
    pub fn set_post_process(&mut self, post_process: ChannelPostProcess) {
        self.post_process = post_process;
    }

    /// Set or clear the render stamp template. Takes effect on the next allocation.
    pub fn set_render_stamp(&mut self, template: Option<String>) {
        self.stamp_template = template.filter(|t| !t.is_empty());
    }

    /// Size the pixels to the region. No-op while inactive or with an empty region.
    pub fn allocate_pixels(&mut self) {
        if !self.active || self.region.is_zero_area() {
            return;
        }
        self.pixels
            .resize_2d(self.region.width(), self.region.height());
        self.stamp = self.stamp_template.as_deref().map(RenderStamp::new);
    }

    /// Release pixels and overlay state.
    pub fn free_pixels(&mut self) {
        self.pixels.reset();
        self.stamp = None;
    }

    /// Copy an externally assembled image of the region into the pixels, then run the
    /// post-process.
    pub fn store_pixels(&mut self, source: &PixelBuffer) -> RenderResult<()> {
        if !self.pixels.is_allocated() {
            return Err(RenderError::invalid_usage(format!(
                "channel {} has no pixels to store into",
                self.descriptor().name
            )));
        }
        if source.width() != self.pixels.width() || source.height() != self.pixels.height() {
            return Err(RenderError::invalid_usage(format!(
                "channel {} holds {}x{}, source is {}x{}",
                self.descriptor().name,
                self.pixels.width(),
                self.pixels.height(),
                source.width(),
                source.height()
            )));
        }
        self.pixels
            .as_mut_slice()
            .copy_from_slice(source.as_slice());
        self.post_process.apply(&mut self.pixels);
        Ok(())
    }

    /// Refresh the pixels from the backend.
    ///
    /// Returns `Ok(false)` when there is nothing to read: the channel is inactive, has no
    /// pixels or an empty region, or the backend has no output for it. On error the previous
    /// pixels are kept intact.
    pub fn read_frame_buffer(
        &mut self,
        pipeline: &mut FrameBufferPipeline,
        session: &mut dyn BackendSession,
        request: &ReadRequest,
        stamp_info: &StampInfo,
    ) -> RenderResult<bool> {
        if !self.active
            || !self.pixels.is_allocated()
            || self.region.is_zero_area()
            || !session.supports_channel(self.id)
            || !session.is_channel_enabled(self.id)
        {
            return Ok(false);
        }

        let request = ReadRequest {
            channel: self.id,
            region: self.region,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            ..request.clone()
        };
        pipeline.read(session, &request, &mut self.pixels)?;
        self.post_process.apply(&mut self.pixels);

        if let Some(stamp) = &self.stamp
            && self.region.is_full_frame(self.frame_width, self.frame_height)
        {
            let (w, h) = (self.pixels.width(), self.pixels.height());
            stamp.apply(
                self.pixels.as_mut_slice(),
                w,
                h,
                request.options.flip,
                stamp_info,
            );
        }
        Ok(true)
    }

    /// Path this channel writes to when every channel gets its own file.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let file = path.file_name().map(PathBuf::from).unwrap_or_default();
        dir.join(self.descriptor().folder).join(file)
    }

    /// Write the pixels through `writer`.
    ///
    /// With `color_only` the image goes to `path` itself; otherwise it is nested under the
    /// channel's folder, which is created when missing. Returns the written path, or `None`
    /// when the channel has nothing to write.
    pub fn write_to_file(
        &self,
        writer: &mut dyn ImageWriter,
        path: &Path,
        color_only: bool,
        format: ImageFormat,
    ) -> RenderResult<Option<PathBuf>> {
        if !self.active || !self.pixels.is_allocated() || self.region.is_zero_area() {
            return Ok(None);
        }
        let target = if color_only {
            path.to_path_buf()
        } else {
            let target = self.output_path(path);
            if let Some(parent) = target.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create channel dir '{}'", parent.display()))?;
            }
            target
        };
        writer
            .write(&target, &self.pixels, format)
            .map_err(|e| e.context(format!("write channel {}", self.descriptor().name)))?;
        Ok(Some(target))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aov/channel.rs"]
mod tests;
