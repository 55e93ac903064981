use crate::aov::channel::ChannelId;
use crate::backend::session::{BackendSession, ChannelSource, RawBuffer};
use crate::buffer::pixel_buffer::PixelBuffer;
use crate::foundation::core::RenderRegion;
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::composite::{
    CatcherInputs, CatcherSettings, composite_catchers, copy_region, merge_opacity,
    normalize_pixels,
};

/// Per-read switches.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReadOptions {
    /// Put the region's bottom row first.
    pub flip: bool,
    /// Read resolved (post-effect) buffers instead of raw accumulation.
    pub resolve: bool,
    /// Take alpha from the opacity channel.
    pub merge_opacity: bool,
    /// Prefer the denoised colour when the backend has a denoiser.
    pub denoise: bool,
    /// Catcher compositing for the colour channel.
    pub catchers: Option<CatcherSettings>,
}

/// One channel readback.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadRequest {
    /// Channel to read.
    pub channel: ChannelId,
    /// Region of the frame to copy out.
    pub region: RenderRegion,
    /// Frame width the backend renders at.
    pub frame_width: u32,
    /// Frame height the backend renders at.
    pub frame_height: u32,
    /// Switches.
    pub options: ReadOptions,
}

/// Counters for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Completed reads.
    pub reads: u64,
    /// Reads that copied a sub-region out of the frame.
    pub partial_reads: u64,
    /// Reads served by the denoiser.
    pub denoised: u64,
    /// Reads that wanted the denoiser but fell back to the plain buffer.
    pub denoise_fallbacks: u64,
    /// Reads that went through catcher compositing.
    pub composited: u64,
}

/// Reads channel data from a backend session and shapes it into channel pixels.
///
/// Order of work: pick resolved or raw data, normalize raw accumulation, composite catchers or
/// denoise or merge opacity (colour only), then copy the requested region, flipping on
/// request. Every fallible step runs before the destination is touched, so a failed read
/// leaves the previous pixels intact.
#[derive(Debug, Default)]
pub struct FrameBufferPipeline {
    scratch: PixelBuffer,
    stats: PipelineStats,
}

impl FrameBufferPipeline {
    /// Create a pipeline with empty scratch storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters since creation.
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Read `request` into `dest`, resizing it to the region.
    pub fn read(
        &mut self,
        session: &mut dyn BackendSession,
        request: &ReadRequest,
        dest: &mut PixelBuffer,
    ) -> RenderResult<()> {
        let region = request.region;
        if region.is_zero_area() {
            return Err(RenderError::invalid_usage(format!(
                "{:?} read with an empty region",
                request.channel
            )));
        }
        if !region.fits_within(request.frame_width, request.frame_height) {
            return Err(RenderError::invalid_usage(format!(
                "{:?} region {region:?} exceeds {}x{} frame",
                request.channel, request.frame_width, request.frame_height
            )));
        }

        let frame = self.frame_data(session, request)?;

        let (w, h) = (region.width(), region.height());
        self.scratch.resize_2d(w, h);
        copy_region(
            self.scratch.as_mut_slice(),
            &frame.pixels,
            frame.width,
            frame.height,
            &region,
            request.options.flip,
        )?;

        if !region.is_full_frame(request.frame_width, request.frame_height) {
            self.stats.partial_reads = self.stats.partial_reads.saturating_add(1);
        }
        dest.resize_2d(w, h);
        dest.as_mut_slice().copy_from_slice(self.scratch.as_slice());
        self.stats.reads = self.stats.reads.saturating_add(1);
        Ok(())
    }

    fn frame_data(
        &mut self,
        session: &mut dyn BackendSession,
        request: &ReadRequest,
    ) -> RenderResult<RawBuffer> {
        let opts = &request.options;
        let is_color = request.channel == ChannelId::Color;

        if is_color
            && let Some(catchers) = opts.catchers
            && let Some(mode) = catchers.mode()
            && catcher_inputs_available(session, &catchers)
        {
            let color = self.channel_frame(session, request, ChannelId::Color)?;
            let opacity = self.channel_frame(session, request, ChannelId::Opacity)?;
            let background = self.channel_frame(session, request, ChannelId::Background)?;
            let shadow = catchers
                .shadow
                .then(|| self.channel_frame(session, request, ChannelId::ShadowCatcher))
                .transpose()?;
            let reflection = catchers
                .reflection
                .then(|| self.channel_frame(session, request, ChannelId::ReflectionCatcher))
                .transpose()?;
            let mut out = color.clone();
            composite_catchers(
                mode,
                &CatcherInputs {
                    color: &color.pixels,
                    opacity: &opacity.pixels,
                    background: &background.pixels,
                    shadow: shadow.as_ref().map(|b| b.pixels.as_slice()),
                    reflection: reflection.as_ref().map(|b| b.pixels.as_slice()),
                },
                &catchers,
                &mut out.pixels,
            )
            .map_err(|e| e.context("catcher composite"))?;
            self.stats.composited = self.stats.composited.saturating_add(1);
            return Ok(out);
        }

        let mut frame = if is_color && opts.denoise {
            match session.denoise(ChannelId::Color) {
                Ok(mut buf) => {
                    self.stats.denoised = self.stats.denoised.saturating_add(1);
                    normalize_in_place(&mut buf);
                    check_dims(&buf, request)?;
                    buf
                }
                Err(e) if e.is_unsupported() => {
                    tracing::warn!("denoiser unavailable, using plain colour: {e}");
                    self.stats.denoise_fallbacks = self.stats.denoise_fallbacks.saturating_add(1);
                    self.channel_frame(session, request, ChannelId::Color)?
                }
                Err(e) => return Err(e.context("denoise")),
            }
        } else {
            self.channel_frame(session, request, request.channel)?
        };

        if is_color && opts.merge_opacity {
            let opacity = if session.is_channel_enabled(ChannelId::Opacity) {
                match self.channel_frame(session, request, ChannelId::Opacity) {
                    Ok(buf) => Some(buf),
                    Err(e) if e.is_unsupported() => None,
                    Err(e) => return Err(e),
                }
            } else {
                None
            };
            merge_opacity(
                &mut frame.pixels,
                opacity.as_ref().map(|b| b.pixels.as_slice()),
                !session.premultiplied_output(),
            );
        }
        Ok(frame)
    }

    fn channel_frame(
        &mut self,
        session: &mut dyn BackendSession,
        request: &ReadRequest,
        id: ChannelId,
    ) -> RenderResult<RawBuffer> {
        let source = if request.options.resolve {
            ChannelSource::Resolved
        } else {
            ChannelSource::Raw
        };
        let mut buf = session
            .read_channel(id, source)
            .map_err(|e| e.context(format!("read {id:?}")))?;
        normalize_in_place(&mut buf);
        check_dims(&buf, request)?;
        Ok(buf)
    }
}

fn catcher_inputs_available(session: &dyn BackendSession, catchers: &CatcherSettings) -> bool {
    let mut needed = vec![ChannelId::Background, ChannelId::Opacity];
    if catchers.shadow {
        needed.push(ChannelId::ShadowCatcher);
    }
    if catchers.reflection {
        needed.push(ChannelId::ReflectionCatcher);
    }
    needed.into_iter().all(|id| session.is_channel_enabled(id))
}

fn normalize_in_place(buf: &mut RawBuffer) {
    if let Some(weights) = buf.weights.take() {
        normalize_pixels(&mut buf.pixels, &weights);
    }
}

fn check_dims(buf: &RawBuffer, request: &ReadRequest) -> RenderResult<()> {
    let expected = buf.width as usize * buf.height as usize;
    if buf.width != request.frame_width
        || buf.height != request.frame_height
        || buf.pixels.len() != expected
    {
        return Err(RenderError::backend(format!(
            "{:?} readback is {}x{} ({} pixels), frame is {}x{}",
            request.channel,
            buf.width,
            buf.height,
            buf.pixels.len(),
            request.frame_width,
            request.frame_height
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/render/framebuffer.rs"]
mod tests;
