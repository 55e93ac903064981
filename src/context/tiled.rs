use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use crate::aov::channel::ChannelId;
use crate::backend::session::{BackendSession, CameraFraming};
use crate::buffer::pixel_buffer::PixelBuffer;
use crate::context::render_context::{
    ContextInner, RenderContext, StateScope, read_options, session_mut,
};
use crate::foundation::core::{Outcome, RenderRegion};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::backplate::{BackplateFit, slice_backplate};
use crate::render::completion::{CompletionCriteriaParams, CompletionEvaluator};
use crate::render::composite::copy_region;
use crate::render::framebuffer::{ReadOptions, ReadRequest};
use crate::render::progress::ProgressPhase;
use crate::render::state::RenderState;
use crate::render::tiles::{
    LensShiftFraming, TileProgress, TileRenderInfo, TileRenderer, TileStats, TileTarget,
};

/// Full-frame images assembled from the tiles rendered so far.
///
/// Rows are top-down. Tiles not yet rendered are transparent.
#[derive(Clone, Debug, Default)]
pub struct TileAccumulators {
    width: u32,
    height: u32,
    buffers: BTreeMap<ChannelId, PixelBuffer>,
}

impl TileAccumulators {
    fn new(ids: &[ChannelId], width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffers: ids
                .iter()
                .map(|id| (*id, PixelBuffer::with_size(width, height)))
                .collect(),
        }
    }

    /// Assembled image of channel `id`.
    pub fn get(&self, id: ChannelId) -> Option<&PixelBuffer> {
        self.buffers.get(&id)
    }

    /// Channels being assembled.
    pub fn ids(&self) -> Vec<ChannelId> {
        self.buffers.keys().copied().collect()
    }

    /// Frame size.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn overwrite(&mut self, id: ChannelId, tile: &PixelBuffer, region: &RenderRegion) -> RenderResult<()> {
        let (w, h) = (self.width, self.height);
        match self.buffers.get_mut(&id) {
            Some(buf) => buf.overwrite(tile.as_slice(), region, w, h),
            None => Ok(()),
        }
    }
}

struct ContextTileTarget<'a> {
    session: &'a mut dyn BackendSession,
    backplate: Option<&'a PixelBuffer>,
    fit: BackplateFit,
    frame: (u32, u32),
    params: CompletionCriteriaParams,
    samples: u32,
    cancelled: &'a dyn Fn() -> bool,
    iterations: u64,
}

impl TileTarget for ContextTileTarget<'_> {
    fn camera_framing(&self) -> CameraFraming {
        self.session.camera_framing()
    }

    fn set_camera_framing(&mut self, framing: CameraFraming) -> RenderResult<()> {
        self.session.set_camera_framing(framing)
    }

    fn prepare_tile(&mut self, _region: &RenderRegion, window: &RenderRegion) -> RenderResult<()> {
        let Some(image) = self.backplate else {
            return Ok(());
        };
        let (w, h) = self.frame;
        self.session
            .set_background_image(Some(slice_backplate(image, self.fit, w, h, window)))
    }

    fn render_tile(&mut self, _region: &RenderRegion) -> RenderResult<Outcome<()>> {
        self.session.clear_accumulation()?;
        let mut completion = CompletionEvaluator::new(self.params);
        completion.start();
        while completion.keep_running() {
            if (self.cancelled)() {
                return Ok(Outcome::Aborted);
            }
            let step = completion.next_step(self.samples);
            if self.session.render_iterations(step)?.is_aborted() {
                return Ok(Outcome::Aborted);
            }
            completion.advance(step);
            self.iterations += u64::from(step);
        }
        Ok(Outcome::Finished(()))
    }
}

impl RenderContext {
    /// Render the frame tile by tile and assemble the active channels.
    ///
    /// Each tile is rendered at the tile size to the full completion criteria, with the
    /// camera lens shift moved over the tile. After each tile `on_tile` sees the progress and
    /// the partly assembled images; returning `false` stops before the next tile. When the
    /// loop ends the backend is returned to the full frame and the assembled images are
    /// stored into the channels, cropped to the render region.
    ///
    /// Only production contexts with finite completion criteria may tile.
    #[tracing::instrument(skip_all)]
    pub fn render_tiles<F>(
        &self,
        cancelled: &dyn Fn() -> bool,
        mut on_tile: F,
    ) -> RenderResult<Outcome<TileStats>>
    where
        F: FnMut(&TileProgress, &TileAccumulators) -> bool,
    {
        if !self.render_type().can_tile() {
            return Err(RenderError::invalid_usage(format!(
                "{:?} contexts cannot render tiles",
                self.render_type()
            )));
        }
        let mut guard = self.lock("render_tiles");
        let inner = &mut *guard.inner;
        session_mut(&mut inner.session, "render_tiles")?;
        if !inner.synced {
            return Err(RenderError::invalid_usage("render_tiles called before freshen"));
        }
        if inner.width == 0 || inner.height == 0 {
            return Err(RenderError::invalid_usage("render_tiles called before resize"));
        }
        if !inner.completion.params().is_finite() {
            return Err(RenderError::invalid_usage(
                "tiled rendering needs finite completion criteria",
            ));
        }
        let renderer = TileRenderer::new(TileRenderInfo {
            total_width: inner.width,
            total_height: inner.height,
            tile_width: inner.settings.tile.width,
            tile_height: inner.settings.tile.height,
        })?;
        let _state = StateScope::enter(&self.machine, RenderState::Rendering, "render_tiles")?;

        let count = u64::from(renderer.info().tile_count());
        inner.progress.emit(ProgressPhase::RenderStart, 0, count, None);
        let mut aborted = false;
        let result = run_tiles(inner, &renderer, cancelled, &mut aborted, &mut on_tile);
        let restored = restore_full_frame(inner).map_err(|e| e.context("restore full frame"));
        let (outcome, accums) = result?;
        restored?;

        let stats = match outcome {
            Outcome::Finished(stats) if !aborted => stats,
            _ => {
                tracing::debug!("tiled render aborted");
                return Ok(Outcome::Aborted);
            }
        };
        store_tiles(inner, &accums)?;
        inner.progress.emit(
            ProgressPhase::RenderComplete,
            u64::from(stats.rendered),
            count,
            None,
        );
        self.needs_redraw.store(true, Ordering::Release);
        tracing::info!(
            rendered = stats.rendered,
            total = stats.total,
            stopped_early = stats.stopped_early,
            "tiled render finished"
        );
        Ok(Outcome::Finished(stats))
    }
}

fn run_tiles<F>(
    inner: &mut ContextInner,
    renderer: &TileRenderer,
    cancelled: &dyn Fn() -> bool,
    aborted: &mut bool,
    on_tile: &mut F,
) -> RenderResult<(Outcome<TileStats>, TileAccumulators)>
where
    F: FnMut(&TileProgress, &TileAccumulators) -> bool,
{
    let info = *renderer.info();
    let options = read_options(&inner.settings, false);
    let session = session_mut(&mut inner.session, "render_tiles")?;
    let ids: Vec<ChannelId> = inner
        .channels
        .active_ids()
        .into_iter()
        .filter(|id| session.is_channel_enabled(*id))
        .collect();
    let mut accums = TileAccumulators::new(&ids, info.total_width, info.total_height);

    session.set_region(None)?;
    session
        .resize(info.tile_width, info.tile_height)
        .map_err(|e| e.context("resize to tile"))?;

    let mut target = ContextTileTarget {
        session,
        backplate: inner.backplate.as_ref(),
        fit: inner.settings.backplate.fit,
        frame: (info.total_width, info.total_height),
        params: *inner.completion.params(),
        samples: inner.settings.samples_per_update,
        cancelled,
        iterations: 0,
    };
    let pipeline = &mut inner.pipeline;
    let progress = &inner.progress;
    let mut tile = PixelBuffer::new();

    let outcome = renderer.render(
        &mut target,
        &LensShiftFraming,
        |p, target| {
            for &id in &ids {
                let request = ReadRequest {
                    channel: id,
                    region: p.local_region,
                    frame_width: info.tile_width,
                    frame_height: info.tile_height,
                    options: if id == ChannelId::Color {
                        options
                    } else {
                        ReadOptions {
                            resolve: options.resolve,
                            ..ReadOptions::default()
                        }
                    },
                };
                pipeline.read(&mut *target.session, &request, &mut tile)?;
                accums.overwrite(id, &tile, &p.region)?;
            }
            progress.emit(
                ProgressPhase::RenderPassStarted,
                u64::from(p.index),
                u64::from(p.count),
                None,
            );
            *aborted = cancelled();
            Ok(on_tile(p, &accums) && !*aborted)
        },
    )?;
    tracing::debug!(iterations = target.iterations, "tile iterations rendered");
    Ok((outcome, accums))
}

fn restore_full_frame(inner: &mut ContextInner) -> RenderResult<()> {
    let (w, h) = (inner.width, inner.height);
    session_mut(&mut inner.session, "render_tiles")?.resize(w, h)?;
    inner.apply_backplate()?;
    inner.apply_region()
}

fn store_tiles(inner: &mut ContextInner, accums: &TileAccumulators) -> RenderResult<()> {
    let (w, h) = accums.size();
    let region = inner.render_region();
    let full = region.is_full_frame(w, h);
    let mut cropped = PixelBuffer::new();
    for id in accums.ids() {
        let Some(frame) = accums.get(id) else {
            continue;
        };
        let channel = inner.channels.get_mut(id);
        if !channel.is_allocated() {
            continue;
        }
        let source = if full {
            frame
        } else {
            cropped.resize_2d(region.width(), region.height());
            copy_region(cropped.as_mut_slice(), frame.as_slice(), w, h, &region, false)?;
            &cropped
        };
        channel
            .store_pixels(source)
            .map_err(|e| e.context(format!("store {} tiles", id.descriptor().name)))?;
    }
    Ok(())
}
