use std::path::{Path, PathBuf};

use crate::aov::channel::{ChannelId, ChannelPostProcess, OutputChannel};
use crate::aov::stamp::StampInfo;
use crate::backend::session::BackendSession;
use crate::context::settings::RenderSettings;
use crate::encode::writer::{ImageFormat, ImageLayer, ImageWriter};
use crate::foundation::core::RenderRegion;
use crate::foundation::error::RenderResult;
use crate::render::framebuffer::{FrameBufferPipeline, ReadOptions, ReadRequest};

/// The full channel catalogue of one render context.
///
/// The colour channel and the render-view channel are always active.
#[derive(Clone, Debug)]
pub struct OutputChannelSet {
    channels: Vec<OutputChannel>,
    render_view: ChannelId,
    region: RenderRegion,
}

impl Default for OutputChannelSet {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputChannelSet {
    /// Every catalogued channel, with only colour active.
    pub fn new() -> Self {
        let channels = ChannelId::ALL
            .into_iter()
            .map(|id| {
                let mut ch = OutputChannel::new(id);
                ch.set_active(id == ChannelId::Color);
                ch
            })
            .collect();
        Self {
            channels,
            render_view: ChannelId::Color,
            region: RenderRegion::EMPTY,
        }
    }

    /// Channel `id`.
    pub fn get(&self, id: ChannelId) -> &OutputChannel {
        &self.channels[id.index() as usize]
    }

    /// Mutable channel `id`.
    pub fn get_mut(&mut self, id: ChannelId) -> &mut OutputChannel {
        &mut self.channels[id.index() as usize]
    }

    /// Channels in catalogue order.
    pub fn iter(&self) -> impl Iterator<Item = &OutputChannel> {
        self.channels.iter()
    }

    /// Number of active channels.
    pub fn active_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_active()).count()
    }

    /// Ids of the active channels, in catalogue order.
    pub fn active_ids(&self) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|c| c.is_active())
            .map(OutputChannel::id)
            .collect()
    }

    /// Channel shown to the user.
    pub fn render_view(&self) -> ChannelId {
        self.render_view
    }

    /// Region every channel covers.
    pub fn region(&self) -> RenderRegion {
        self.region
    }

    /// Take activation, depth normalization and render stamp from `settings`.
    ///
    /// Pixels of channels that become inactive are released; newly active channels allocate
    /// on the next [`OutputChannelSet::allocate_pixels`].
    pub fn read_from_settings(&mut self, settings: &RenderSettings) {
        self.render_view = settings.render_view;
        for ch in &mut self.channels {
            let id = ch.id();
            ch.set_active(settings.is_channel_enabled(id));
            if id == ChannelId::Depth {
                ch.set_post_process(ChannelPostProcess::Depth(settings.depth));
            }
            ch.set_render_stamp(settings.render_stamp.clone());
        }
    }

    /// Enable a backend output for every active channel.
    ///
    /// Channels the backend cannot produce are logged and skipped; their pixels stay
    /// unread. Returns the channels that were enabled.
    pub fn apply_to_context(&self, session: &mut dyn BackendSession) -> RenderResult<Vec<ChannelId>> {
        let mut enabled = Vec::new();
        for ch in self.channels.iter().filter(|c| c.is_active()) {
            let id = ch.id();
            if !session.supports_channel(id) {
                tracing::warn!(channel = ch.descriptor().name, "backend cannot produce channel");
                continue;
            }
            session
                .enable_channel(id, true)
                .map_err(|e| e.context(format!("enable {}", ch.descriptor().name)))?;
            enabled.push(id);
        }
        Ok(enabled)
    }

    /// Mirror the backend's enabled outputs into channel activation.
    ///
    /// Colour and the render view stay active regardless.
    pub fn set_from_context(&mut self, session: &dyn BackendSession) {
        let render_view = self.render_view;
        for ch in &mut self.channels {
            let id = ch.id();
            let active =
                id == ChannelId::Color || id == render_view || session.is_channel_enabled(id);
            ch.set_active(active);
        }
    }

    /// Set the region of every channel.
    pub fn set_region(&mut self, region: RenderRegion, frame_width: u32, frame_height: u32) {
        self.region = region;
        for ch in &mut self.channels {
            ch.set_region(region, frame_width, frame_height);
        }
    }

    /// Allocate pixels for every active channel.
    pub fn allocate_pixels(&mut self) {
        for ch in &mut self.channels {
            ch.allocate_pixels();
        }
    }

    /// Release every channel's pixels.
    pub fn free_pixels(&mut self) {
        for ch in &mut self.channels {
            ch.free_pixels();
        }
    }

    /// Read every active channel from the backend. Returns how many were read.
    ///
    /// Colour gets `options` in full; the other channels only honour `flip` and `resolve`.
    /// Stops at the first failing channel; channels not yet read keep their pixels.
    pub fn read_frame_buffers(
        &mut self,
        pipeline: &mut FrameBufferPipeline,
        session: &mut dyn BackendSession,
        options: &ReadOptions,
        stamp_info: &StampInfo,
    ) -> RenderResult<usize> {
        let mut read = 0;
        for ch in self.channels.iter_mut().filter(|c| c.is_active()) {
            let (frame_width, frame_height) = ch.frame_size();
            let options = if ch.id() == ChannelId::Color {
                *options
            } else {
                ReadOptions {
                    flip: options.flip,
                    resolve: options.resolve,
                    ..ReadOptions::default()
                }
            };
            let request = ReadRequest {
                channel: ch.id(),
                region: ch.region(),
                frame_width,
                frame_height,
                options,
            };
            if ch.read_frame_buffer(pipeline, session, &request, stamp_info)? {
                read += 1;
            }
        }
        Ok(read)
    }

    /// Write the active channels to disk.
    ///
    /// A lone colour channel goes to `path` itself. Otherwise layered formats get one file
    /// holding every channel as a layer, and everything else (or a writer without layer
    /// support) gets one file per channel under the channel folders. Returns the written
    /// paths.
    pub fn write_to_file(
        &self,
        writer: &mut dyn ImageWriter,
        path: &Path,
        format: ImageFormat,
    ) -> RenderResult<Vec<PathBuf>> {
        let color_only = self.active_count() == 1;
        if !color_only && format.supports_layers() {
            let layers: Vec<ImageLayer<'_>> = self
                .channels
                .iter()
                .filter(|c| c.is_active())
                .filter_map(|c| {
                    c.pixels().map(|pixels| ImageLayer {
                        name: c.descriptor().name,
                        pixels,
                    })
                })
                .collect();
            match writer.write_layers(path, &layers, format) {
                Ok(()) => return Ok(vec![path.to_path_buf()]),
                Err(e) if e.is_unsupported() => {
                    tracing::debug!("writer has no layer support, writing one file per channel");
                }
                Err(e) => return Err(e),
            }
        }

        let mut written = Vec::new();
        for ch in &self.channels {
            if let Some(p) = ch.write_to_file(writer, path, color_only, format)? {
                written.push(p);
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aov/channel_set.rs"]
mod tests;
