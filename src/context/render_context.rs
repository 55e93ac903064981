use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use parking_lot::Mutex;

use crate::aov::channel::ChannelId;
use crate::aov::channel_set::OutputChannelSet;
use crate::aov::stamp::StampInfo;
use crate::backend::session::{
    AbortSignal, BackendSession, CameraFraming, CreationFlags, PostEffect, RenderBackend,
    RenderQuality,
};
use crate::buffer::pixel_buffer::PixelBuffer;
use crate::context::cleanup::{CleanupHandle, CleanupStats};
use crate::context::fingerprint::StateHasher;
use crate::context::settings::RenderSettings;
use crate::encode::decode::load_image;
use crate::encode::writer::{ImageFileDescription, ImageWriter};
use crate::foundation::core::{Outcome, RenderRegion};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::backplate::slice_backplate;
use crate::render::completion::{CompletionCriteriaParams, CompletionEvaluator, CompletionMode};
use crate::render::framebuffer::{FrameBufferPipeline, PipelineStats, ReadOptions, ReadRequest};
use crate::render::progress::{ProgressCallback, ProgressPhase, ProgressReporter};
use crate::render::state::{RenderState, StateLock, StateMachine, StateTransition};
use crate::scene::arena::{ObjectHandle, SceneArena};
use crate::scene::dirty::DirtyBatch;
use crate::scene::graph::{NodeId, ObjectSnapshot, SceneGraph};
use crate::scene::listener::{RefreshScope, SceneListener, SceneShared};

/// Iterations a thumbnail context renders before it is complete.
pub const THUMBNAIL_ITERATIONS: u32 = 16;

const MAX_RAMP_SHIFT: u32 = 5;

/// Kind of caller a render context serves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderType {
    /// Offline frame render. The only type that may tile.
    #[default]
    Production,
    /// Interactive (IPR) window.
    Interactive,
    /// Viewport panel.
    Viewport,
    /// Material or scene thumbnail.
    Thumbnail,
}

impl RenderType {
    /// Interactive and viewport sessions.
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Interactive | Self::Viewport)
    }

    /// Whether tiled rendering is allowed.
    pub fn can_tile(self) -> bool {
        self == Self::Production
    }

    /// Criteria in force for this render type given the configured ones.
    pub fn completion(self, configured: &CompletionCriteriaParams) -> CompletionCriteriaParams {
        match self {
            Self::Thumbnail => CompletionCriteriaParams::thumbnail(THUMBNAIL_ITERATIONS),
            _ => *configured,
        }
    }
}

/// Counts of one freshen call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Objects created in the backend.
    pub added: usize,
    /// Objects removed from the backend.
    pub removed: usize,
    /// Objects re-sent to the backend.
    pub updated: usize,
    /// Dirty objects whose attributes had not actually changed.
    pub unchanged: usize,
    /// Records whose object or node no longer existed.
    pub expired: usize,
    /// Added nodes that do not affect rendering.
    pub skipped: usize,
    /// Changed global settings were pushed to the backend.
    pub settings_applied: bool,
}

impl SyncReport {
    /// True when the backend scene or its settings changed.
    pub fn changed(&self) -> bool {
        self.added + self.removed + self.updated > 0 || self.settings_applied
    }
}

/// Result of one render call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderPass {
    /// Iterations rendered by this call.
    pub iterations: u32,
    /// Iterations rendered since the session (re)started.
    pub total_iterations: u32,
    /// Percent complete, `None` for unlimited sessions.
    pub progress: Option<u32>,
    /// The completion criteria are met.
    pub complete: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct RegisteredObject {
    pub(crate) node: NodeId,
    pub(crate) key: String,
    pub(crate) snapshot: ObjectSnapshot,
}

#[derive(Debug)]
enum SyncOp {
    Insert {
        node: NodeId,
        key: String,
        snapshot: ObjectSnapshot,
    },
    Update {
        handle: ObjectHandle,
        key: String,
        snapshot: ObjectSnapshot,
    },
    Remove {
        handle: ObjectHandle,
    },
}

#[derive(Debug, Default)]
struct SyncPlan {
    ops: Vec<SyncOp>,
    report: SyncReport,
}

pub(crate) struct ContextInner {
    pub(crate) session: Option<Box<dyn BackendSession>>,
    pub(crate) settings: RenderSettings,
    pub(crate) channels: OutputChannelSet,
    pub(crate) pipeline: FrameBufferPipeline,
    pub(crate) completion: CompletionEvaluator,
    pub(crate) objects: SceneArena<RegisteredObject>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    region: RenderRegion,
    use_region: bool,
    pub(crate) synced: bool,
    pub(crate) restart: bool,
    settings_dirty: bool,
    ramp: u32,
    attached_effects: Vec<PostEffect>,
    pub(crate) backplate: Option<PixelBuffer>,
    pub(crate) progress: ProgressReporter,
    complete_reported: bool,
    first_pass_logged: bool,
}

impl std::fmt::Debug for ContextInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextInner")
            .field("session", &self.session.as_ref().map(|s| s.name().to_string()))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("region", &self.region)
            .field("use_region", &self.use_region)
            .field("objects", &self.objects.len())
            .field("synced", &self.synced)
            .field("restart", &self.restart)
            .finish_non_exhaustive()
    }
}

impl ContextInner {
    fn new(settings: RenderSettings, render_type: RenderType) -> Self {
        let mut channels = OutputChannelSet::new();
        channels.read_from_settings(&settings);
        let completion = CompletionEvaluator::new(render_type.completion(&settings.completion));
        Self {
            session: None,
            settings,
            channels,
            pipeline: FrameBufferPipeline::new(),
            completion,
            objects: SceneArena::new(),
            width: 0,
            height: 0,
            region: RenderRegion::EMPTY,
            use_region: false,
            synced: false,
            restart: true,
            settings_dirty: true,
            ramp: 0,
            attached_effects: Vec::new(),
            backplate: None,
            progress: ProgressReporter::default(),
            complete_reported: false,
            first_pass_logged: false,
        }
    }

    /// Region the channels cover: the user region when enabled and valid, else the frame.
    pub(crate) fn render_region(&self) -> RenderRegion {
        if self.use_region
            && !self.region.is_zero_area()
            && self.region.fits_within(self.width, self.height)
        {
            self.region
        } else {
            RenderRegion::from_size(self.width, self.height)
        }
    }

    /// Resize channel storage to the current region and point the backend at it.
    pub(crate) fn apply_region(&mut self) -> RenderResult<()> {
        let region = self.render_region();
        let (w, h) = (self.width, self.height);
        self.channels.set_region(region, w, h);
        self.channels.allocate_pixels();
        if let Some(session) = self.session.as_deref_mut()
            && w > 0
            && h > 0
        {
            let backend_region = (!region.is_full_frame(w, h) && session.supports_region())
                .then_some(region);
            session
                .set_region(backend_region)
                .map_err(|e| e.context("set render region"))?;
        }
        self.restart = true;
        Ok(())
    }

    /// Fit the backplate to the whole frame and hand it to the backend.
    pub(crate) fn apply_backplate(&mut self) -> RenderResult<()> {
        let (w, h) = (self.width, self.height);
        let fit = self.settings.backplate.fit;
        let Some(session) = self.session.as_deref_mut() else {
            return Ok(());
        };
        let plate = match &self.backplate {
            Some(image) if w > 0 && h > 0 => Some(slice_backplate(
                image,
                fit,
                w,
                h,
                &RenderRegion::from_size(w, h),
            )),
            _ => None,
        };
        session
            .set_background_image(plate)
            .map_err(|e| e.context("set backplate"))
    }

    fn apply_settings(&mut self, render_type: RenderType) -> RenderResult<()> {
        let Some(session) = self.session.as_deref_mut() else {
            return Ok(());
        };
        let settings = &self.settings;

        for effect in &self.attached_effects {
            if !settings
                .post_effects
                .iter()
                .any(|e| e.kind() == effect.kind())
            {
                session.set_post_effect(*effect, false)?;
            }
        }
        for effect in &settings.post_effects {
            session
                .set_post_effect(*effect, true)
                .map_err(|e| e.context("attach post effect"))?;
        }
        self.attached_effects = settings.post_effects.clone();

        session.set_render_quality(settings.quality)?;
        if let Some(framing) = settings.camera {
            session.set_camera_framing(framing)?;
        }

        self.channels.read_from_settings(settings);
        let enabled = self.channels.apply_to_context(session)?;
        let auxiliary = auxiliary_channels(settings);
        for id in ChannelId::ALL {
            let wanted = enabled.contains(&id) || auxiliary.contains(&id);
            if wanted && !session.is_channel_enabled(id) && session.supports_channel(id) {
                session.enable_channel(id, true)?;
            } else if !wanted && session.is_channel_enabled(id) {
                session.enable_channel(id, false)?;
            }
        }

        self.completion
            .set_params(render_type.completion(&settings.completion));
        self.apply_backplate()?;
        self.channels.allocate_pixels();
        self.settings_dirty = false;
        self.restart = true;
        Ok(())
    }

    fn commit(&mut self, shared: &SceneShared, plan: &SyncPlan) -> RenderResult<SyncReport> {
        let mut report = plan.report;
        let session = session_mut(&mut self.session, "freshen")?;
        let total = plan.ops.len() as u64;
        self.progress
            .emit(ProgressPhase::SyncStarted, 0, total, None);

        for (i, op) in plan.ops.iter().enumerate() {
            let i = i as u64;
            match op {
                SyncOp::Insert {
                    node,
                    key,
                    snapshot,
                } => {
                    self.progress
                        .emit(ProgressPhase::ObjectPreSync, i, total, Some(key.as_str()));
                    session
                        .upsert_object(key, snapshot)
                        .map_err(|e| e.context(format!("add '{key}'")))?;
                    let handle = self.objects.insert(RegisteredObject {
                        node: *node,
                        key: key.clone(),
                        snapshot: snapshot.clone(),
                    });
                    shared.register(*node, handle);
                    report.added += 1;
                    tracing::trace!(key = %key, "object added");
                    self.progress
                        .emit(ProgressPhase::ObjectSyncComplete, i, total, Some(key.as_str()));
                }
                SyncOp::Update {
                    handle,
                    key,
                    snapshot,
                } => {
                    let Some(obj) = self.objects.get_mut(*handle) else {
                        continue;
                    };
                    self.progress
                        .emit(ProgressPhase::ObjectPreSync, i, total, Some(key.as_str()));
                    if obj.key != *key {
                        session
                            .remove_object(&obj.key)
                            .map_err(|e| e.context(format!("rename '{}'", obj.key)))?;
                    }
                    session
                        .upsert_object(key, snapshot)
                        .map_err(|e| e.context(format!("update '{key}'")))?;
                    obj.key = key.clone();
                    obj.snapshot = snapshot.clone();
                    report.updated += 1;
                    tracing::trace!(key = %key, "object updated");
                    self.progress
                        .emit(ProgressPhase::ObjectSyncComplete, i, total, Some(key.as_str()));
                }
                SyncOp::Remove { handle } => {
                    let Some(obj) = self.objects.get(*handle) else {
                        continue;
                    };
                    self.progress
                        .emit(ProgressPhase::ObjectPreSync, i, total, Some(obj.key.as_str()));
                    session
                        .remove_object(&obj.key)
                        .map_err(|e| e.context(format!("remove '{}'", obj.key)))?;
                    if let Some(obj) = self.objects.remove(*handle) {
                        shared.unregister(obj.node);
                        tracing::trace!(key = %obj.key, "object removed");
                        self.progress.emit(
                            ProgressPhase::ObjectSyncComplete,
                            i,
                            total,
                            Some(obj.key.as_str()),
                        );
                    }
                    report.removed += 1;
                }
            }
        }
        Ok(report)
    }

    fn render_pass(&mut self, render_type: RenderType) -> RenderResult<Outcome<RenderPass>> {
        let session = session_mut(&mut self.session, "render")?;
        let total = match self.completion.params().mode {
            CompletionMode::IterationCount => u64::from(self.completion.params().max_iterations),
            CompletionMode::Unlimited | CompletionMode::TimeLimit => 0,
        };

        if self.restart || !self.completion.is_started() {
            session
                .clear_accumulation()
                .map_err(|e| e.context("clear accumulation"))?;
            self.completion.start();
            self.restart = false;
            self.ramp = 0;
            self.complete_reported = false;
            self.progress
                .emit(ProgressPhase::RenderStart, 0, total, None);
        }

        let current = self.completion.current_iteration();
        if !self.completion.keep_running() {
            return Ok(Outcome::Finished(RenderPass {
                iterations: 0,
                total_iterations: current,
                progress: self.completion.progress(),
                complete: true,
            }));
        }

        let samples = if render_type.is_interactive() && self.settings.iteration_ramp {
            1 << self.ramp.min(MAX_RAMP_SHIFT)
        } else {
            self.settings.samples_per_update
        };
        let step = self.completion.next_step(samples);
        self.progress.emit(
            ProgressPhase::RenderPassStarted,
            u64::from(current),
            total,
            None,
        );

        if session
            .render_iterations(step)
            .map_err(|e| e.context("render"))?
            .is_aborted()
        {
            tracing::debug!(iteration = current, "render pass aborted");
            return Ok(Outcome::Aborted);
        }
        self.completion.advance(step);
        self.ramp = self.ramp.saturating_add(1);
        self.completion.set_shaders_cached(session.shaders_cached());
        if !self.first_pass_logged {
            self.first_pass_logged = true;
            tracing::info!(
                memory_bytes = session.memory_usage(),
                iterations = step,
                "first render pass finished"
            );
        }

        let complete = !self.completion.keep_running();
        let total_iterations = self.completion.current_iteration();
        if complete && !self.complete_reported {
            self.complete_reported = true;
            self.progress.emit(
                ProgressPhase::RenderComplete,
                u64::from(total_iterations),
                total,
                None,
            );
        }
        Ok(Outcome::Finished(RenderPass {
            iterations: step,
            total_iterations,
            progress: self.completion.progress(),
            complete,
        }))
    }

    pub(crate) fn stamp_info(&self) -> StampInfo {
        StampInfo {
            iterations: self.completion.current_iteration(),
            render_time: self.completion.elapsed(),
            object_count: self.objects.len(),
            renderer: self
                .session
                .as_ref()
                .map(|s| s.name().to_string())
                .unwrap_or_default(),
            width: self.width,
            height: self.height,
        }
    }
}

pub(crate) fn session_mut<'a>(
    session: &'a mut Option<Box<dyn BackendSession>>,
    what: &str,
) -> RenderResult<&'a mut dyn BackendSession> {
    match session.as_deref_mut() {
        Some(s) => Ok(s),
        None => Err(RenderError::invalid_usage(format!(
            "{what} called before initialize"
        ))),
    }
}

/// Backend outputs needed by compositing but not necessarily shown as channels.
pub(crate) fn auxiliary_channels(settings: &RenderSettings) -> Vec<ChannelId> {
    let mut ids = Vec::new();
    if settings.camera_alpha_mask {
        ids.push(ChannelId::Opacity);
    }
    if settings.catchers.mode().is_some() {
        ids.extend([ChannelId::Opacity, ChannelId::Background]);
        if settings.catchers.shadow {
            ids.push(ChannelId::ShadowCatcher);
        }
        if settings.catchers.reflection {
            ids.push(ChannelId::ReflectionCatcher);
        }
    }
    ids
}

/// Readback switches derived from the settings.
pub(crate) fn read_options(settings: &RenderSettings, flip: bool) -> ReadOptions {
    ReadOptions {
        flip,
        resolve: !settings.post_effects.is_empty(),
        merge_opacity: settings.camera_alpha_mask,
        denoise: settings.denoiser,
        catchers: settings
            .catchers
            .mode()
            .is_some()
            .then_some(settings.catchers),
    }
}

fn stage(
    scene: &dyn SceneGraph,
    shared: &SceneShared,
    objects: &SceneArena<RegisteredObject>,
    batch: &DirtyBatch,
    cancelled: &dyn Fn() -> bool,
) -> Outcome<SyncPlan> {
    let mut plan = SyncPlan::default();
    let mut seen = HashSet::new();

    for node in &batch.removed {
        if let Some(handle) = shared.handle_of(*node)
            && objects.contains(handle)
            && seen.insert(handle)
        {
            plan.ops.push(SyncOp::Remove { handle });
        }
    }
    if cancelled() {
        return Outcome::Aborted;
    }

    for node in &batch.added {
        match shared.handle_of(*node) {
            Some(handle) if objects.contains(handle) => {
                if seen.insert(handle) {
                    stage_update(scene, objects, handle, &mut plan);
                }
            }
            _ => match scene.snapshot(*node) {
                None => plan.report.expired += 1,
                Some(_) if !scene.affects_render(*node) => plan.report.skipped += 1,
                Some((key, snapshot)) => plan.ops.push(SyncOp::Insert {
                    node: *node,
                    key,
                    snapshot,
                }),
            },
        }
    }
    if cancelled() {
        return Outcome::Aborted;
    }

    for handle in &batch.dirty {
        if seen.insert(*handle) {
            stage_update(scene, objects, *handle, &mut plan);
        }
    }
    Outcome::Finished(plan)
}

fn stage_update(
    scene: &dyn SceneGraph,
    objects: &SceneArena<RegisteredObject>,
    handle: ObjectHandle,
    plan: &mut SyncPlan,
) {
    let Some(obj) = objects.get(handle) else {
        plan.report.expired += 1;
        return;
    };
    match scene.snapshot(obj.node) {
        None => plan.ops.push(SyncOp::Remove { handle }),
        Some(_) if !scene.affects_render(obj.node) => plan.ops.push(SyncOp::Remove { handle }),
        Some((key, snapshot)) if key == obj.key && snapshot == obj.snapshot => {
            plan.report.unchanged += 1;
        }
        Some((key, snapshot)) => plan.ops.push(SyncOp::Update {
            handle,
            key,
            snapshot,
        }),
    }
}

/// Holds a state for the duration of one operation and restores the previous one on drop.
pub(crate) struct StateScope<'m> {
    machine: &'m StateMachine,
    prior: RenderState,
    tag: &'static str,
}

impl<'m> StateScope<'m> {
    pub(crate) fn enter(
        machine: &'m StateMachine,
        state: RenderState,
        tag: &'static str,
    ) -> RenderResult<Self> {
        let prior = machine.state();
        if prior == RenderState::Exiting {
            return Err(RenderError::invalid_usage(format!(
                "{tag}: context has been torn down"
            )));
        }
        machine.transition(state, tag);
        Ok(Self {
            machine,
            prior,
            tag,
        })
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        if self.machine.state() != RenderState::Exiting {
            self.machine.transition(self.prior, self.tag);
        }
    }
}

/// Owns one backend session and keeps it in step with a host scene graph.
///
/// Every method that touches the session takes the context lock; callers that need several
/// steps under one hold use [`RenderContext::lock`] and the [`ContextGuard`] methods. Scene
/// callbacks go through [`RenderContext::listener`] and never wait on that lock.
pub struct RenderContext {
    backend: Arc<dyn RenderBackend>,
    pub(crate) scene: Arc<dyn SceneGraph>,
    render_type: RenderType,
    pub(crate) machine: StateMachine,
    pub(crate) inner: Mutex<ContextInner>,
    pub(crate) shared: Arc<SceneShared>,
    abort: AbortSignal,
    pub(crate) needs_redraw: AtomicBool,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.backend.name())
            .field("render_type", &self.render_type)
            .field("state", &self.machine.state())
            .field("holder", &self.machine.holder())
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    /// Context with default settings. Call [`RenderContext::initialize`] before rendering.
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        scene: Arc<dyn SceneGraph>,
        render_type: RenderType,
    ) -> Self {
        Self {
            backend,
            scene,
            render_type,
            machine: StateMachine::new(),
            inner: Mutex::new(ContextInner::new(RenderSettings::default(), render_type)),
            shared: Arc::new(SceneShared::default()),
            abort: AbortSignal::new(),
            needs_redraw: AtomicBool::new(false),
        }
    }

    /// Kind of caller this context serves.
    pub fn render_type(&self) -> RenderType {
        self.render_type
    }

    /// Take the context lock without changing state.
    pub fn lock(&self, tag: &'static str) -> ContextGuard<'_> {
        ContextGuard {
            ctx: self,
            inner: self.machine.lock(&self.inner, None, tag),
        }
    }

    /// Like [`RenderContext::lock`], giving up after `timeout`.
    pub fn try_lock_for(
        &self,
        tag: &'static str,
        timeout: Duration,
    ) -> RenderResult<ContextGuard<'_>> {
        Ok(ContextGuard {
            ctx: self,
            inner: self.machine.try_lock_for(&self.inner, None, tag, timeout)?,
        })
    }

    /// Sink for the host's scene change callbacks.
    pub fn listener(&self) -> SceneListener {
        SceneListener::new(Arc::clone(&self.shared))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RenderState {
        self.machine.state()
    }

    /// Recent state changes, oldest first.
    pub fn recent_transitions(&self) -> Vec<StateTransition> {
        self.machine.recent_transitions()
    }

    /// Create the backend session and queue every scene node for the first freshen.
    ///
    /// A second call on a live context is [`RenderError::InvalidUsage`].
    #[tracing::instrument(skip(self, flags), fields(render_type = ?self.render_type))]
    pub fn initialize(&self, flags: &CreationFlags) -> RenderResult<()> {
        flags.validate()?;
        let mut guard = self.lock("initialize");
        let _state = StateScope::enter(&self.machine, RenderState::Updating, "initialize")?;
        let inner = &mut *guard.inner;
        if inner.session.is_some() {
            return Err(RenderError::invalid_usage("context is already initialized"));
        }

        self.abort.clear();
        let mut session = self
            .backend
            .create_session(flags, self.abort.clone())
            .map_err(|e| e.context("create session"))?;
        if inner.width > 0 && inner.height > 0 {
            session
                .resize(inner.width, inner.height)
                .map_err(|e| e.context("resize"))?;
        }
        tracing::info!(
            backend = self.backend.name(),
            session = session.name(),
            "render session created"
        );
        inner.session = Some(session);
        inner.settings_dirty = true;
        if let Err(e) = inner
            .apply_settings(self.render_type)
            .and_then(|()| inner.apply_region())
        {
            inner.session = None;
            return Err(e);
        }

        for node in self.scene.nodes() {
            self.shared.tracker.mark_added(node);
        }
        self.shared.dirty.store(true, Ordering::Release);
        inner.synced = false;
        Ok(())
    }

    /// Current settings.
    pub fn settings(&self) -> RenderSettings {
        self.lock("settings").inner.settings.clone()
    }

    /// Replace the settings. Backend-side changes are applied by the next freshen.
    ///
    /// The backplate image is decoded before the lock is taken.
    pub fn set_settings(&self, settings: RenderSettings) -> RenderResult<()> {
        settings.validate()?;
        let backplate = settings
            .backplate
            .image
            .as_deref()
            .map(load_image)
            .transpose()
            .map_err(|e| e.context("load backplate"))?;

        let mut guard = self.lock("set_settings");
        let _state = StateScope::enter(&self.machine, RenderState::Updating, "set_settings")?;
        let inner = &mut *guard.inner;
        inner.settings = settings;
        inner.backplate = backplate;
        inner.channels.read_from_settings(&inner.settings);
        inner.channels.allocate_pixels();
        inner
            .completion
            .set_params(self.render_type.completion(&inner.settings.completion));
        inner.settings_dirty = true;
        inner.synced = false;
        inner.restart = true;
        self.shared.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Frame size.
    pub fn size(&self) -> (u32, u32) {
        let guard = self.lock("size");
        (guard.inner.width, guard.inner.height)
    }

    /// Resize the backend frame and every active channel. Required before the first render
    /// after a size change.
    #[tracing::instrument(skip(self))]
    pub fn resize(&self, width: u32, height: u32) -> RenderResult<()> {
        let mut guard = self.lock("resize");
        let _state = StateScope::enter(&self.machine, RenderState::Updating, "resize")?;
        let inner = &mut *guard.inner;
        if let Some(session) = inner.session.as_deref_mut() {
            session
                .resize(width, height)
                .map_err(|e| e.context("resize"))?;
        }
        inner.width = width;
        inner.height = height;
        inner.apply_backplate()?;
        inner.apply_region()
    }

    /// Set the sub-rectangle rendered while region rendering is enabled.
    pub fn set_render_region(&self, region: RenderRegion) -> RenderResult<()> {
        let mut guard = self.lock("set_render_region");
        let _state =
            StateScope::enter(&self.machine, RenderState::Updating, "set_render_region")?;
        let inner = &mut *guard.inner;
        if !region.fits_within(inner.width, inner.height) {
            return Err(RenderError::invalid_usage(format!(
                "region {region:?} exceeds {}x{} frame",
                inner.width, inner.height
            )));
        }
        inner.region = region;
        inner.apply_region()
    }

    /// Toggle region rendering. Disabling it returns every channel to the full frame.
    pub fn use_region(&self, enabled: bool) -> RenderResult<()> {
        let mut guard = self.lock("use_region");
        let _state = StateScope::enter(&self.machine, RenderState::Updating, "use_region")?;
        guard.inner.use_region = enabled;
        guard.inner.apply_region()
    }

    /// Region the channels currently cover.
    pub fn render_region(&self) -> RenderRegion {
        self.lock("render_region").inner.render_region()
    }

    /// Synchronize the backend with the scene. See [`ContextGuard::freshen`].
    pub fn freshen(&self, cancelled: &dyn Fn() -> bool) -> RenderResult<Outcome<SyncReport>> {
        self.lock("freshen").freshen(cancelled)
    }

    /// Run one progressive step. See [`ContextGuard::render`].
    pub fn render(&self) -> RenderResult<Outcome<RenderPass>> {
        self.lock("render").render()
    }

    /// Render until the completion criteria are met, releasing the lock between passes.
    ///
    /// Unlimited criteria are refused since the loop would never end.
    pub fn render_until_complete(
        &self,
        cancelled: &dyn Fn() -> bool,
    ) -> RenderResult<Outcome<RenderPass>> {
        if !self.lock("render_until_complete").inner.completion.params().is_finite() {
            return Err(RenderError::invalid_usage(
                "render_until_complete needs finite completion criteria",
            ));
        }
        loop {
            if cancelled() {
                return Ok(Outcome::Aborted);
            }
            match self.render()? {
                Outcome::Finished(pass) if pass.complete => return Ok(Outcome::Finished(pass)),
                Outcome::Finished(_) => {}
                Outcome::Aborted => return Ok(Outcome::Aborted),
            }
        }
    }

    /// Read every active channel back. See [`ContextGuard::read_frame_buffers`].
    pub fn read_frame_buffers(&self, flip: bool) -> RenderResult<usize> {
        self.lock("read_frame_buffers").read_frame_buffers(flip)
    }

    /// Read one channel and return a copy of its pixels. See [`ContextGuard::read_channel`].
    pub fn read_channel(&self, id: ChannelId, flip: bool) -> RenderResult<PixelBuffer> {
        self.lock("read_channel").read_channel(id, flip)
    }

    /// Copy of the last pixels read for `id`, if any.
    pub fn channel_pixels(&self, id: ChannelId) -> Option<PixelBuffer> {
        self.lock("channel_pixels")
            .inner
            .channels
            .get(id)
            .pixels()
            .cloned()
    }

    /// Ids of the active channels.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.lock("active_channels").inner.channels.active_ids()
    }

    /// Write the active channels through `writer`. Returns the written paths.
    pub fn save_to_file(
        &self,
        writer: &mut dyn ImageWriter,
        path: &Path,
        description: &ImageFileDescription,
    ) -> RenderResult<Vec<PathBuf>> {
        let guard = self.lock("save_to_file");
        guard
            .inner
            .channels
            .write_to_file(writer, path, description.format)
            .map_err(|e| e.context(format!("save '{}'", path.display())))
    }

    /// Ask a running render to stop at its next checkpoint. Does not take the lock.
    pub fn abort_render(&self) {
        self.abort.raise();
    }

    /// Whether the image changed since the flag was last cleared.
    pub fn needs_redraw(&self, clear: bool) -> bool {
        if clear {
            self.needs_redraw.swap(false, Ordering::AcqRel)
        } else {
            self.needs_redraw.load(Ordering::Acquire)
        }
    }

    /// Whether scene changes are waiting for a freshen.
    pub fn is_scene_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::Acquire) || !self.shared.tracker.is_empty()
    }

    /// Queue a registered object for re-synchronisation.
    pub fn set_dirty_object(&self, handle: ObjectHandle) {
        self.listener().object_changed(handle);
    }

    /// Queue a host node for addition.
    pub fn add_node(&self, node: NodeId) {
        self.listener().node_added(node);
    }

    /// Queue a host node for removal.
    pub fn remove_node(&self, node: NodeId) {
        self.listener().node_removed(node);
    }

    /// Whether the completion criteria still want iterations.
    pub fn keep_running(&self) -> bool {
        self.lock("keep_running").inner.completion.keep_running()
    }

    /// Percent complete, `None` for unlimited sessions.
    pub fn progress(&self) -> Option<u32> {
        self.lock("progress").inner.completion.progress()
    }

    /// Advisory "warming up" hint for UIs.
    pub fn is_first_iteration_and_shaders_not_cached(&self) -> bool {
        self.lock("shader_hint")
            .inner
            .completion
            .is_first_iteration_and_shaders_not_cached()
    }

    /// Install or clear the progress callback.
    pub fn set_progress_callback(&self, callback: Option<ProgressCallback>) {
        self.lock("set_progress_callback")
            .inner
            .progress
            .set_callback(callback);
    }

    /// Backend memory in use, 0 before initialize.
    pub fn memory_usage(&self) -> u64 {
        self.lock("memory_usage")
            .inner
            .session
            .as_ref()
            .map_or(0, |s| s.memory_usage())
    }

    /// Select a backend quality level.
    pub fn set_render_quality(&self, quality: RenderQuality) -> RenderResult<()> {
        let mut guard = self.lock("set_render_quality");
        let _state =
            StateScope::enter(&self.machine, RenderState::Updating, "set_render_quality")?;
        let inner = &mut *guard.inner;
        if let Some(session) = inner.session.as_deref_mut() {
            session.set_render_quality(quality)?;
        }
        inner.settings.quality = quality;
        inner.restart = true;
        Ok(())
    }

    /// Backend camera framing, `None` before initialize.
    pub fn camera_framing(&self) -> Option<CameraFraming> {
        self.lock("camera_framing")
            .inner
            .session
            .as_ref()
            .map(|s| s.camera_framing())
    }

    /// Replace the camera framing.
    pub fn set_camera_framing(&self, framing: CameraFraming) -> RenderResult<()> {
        let mut guard = self.lock("set_camera_framing");
        let _state =
            StateScope::enter(&self.machine, RenderState::Updating, "set_camera_framing")?;
        let inner = &mut *guard.inner;
        if let Some(session) = inner.session.as_deref_mut() {
            session.set_camera_framing(framing)?;
        }
        inner.settings.camera = Some(framing);
        inner.restart = true;
        Ok(())
    }

    /// Keys of the objects registered in the backend scene, sorted.
    pub fn object_keys(&self) -> Vec<String> {
        let guard = self.lock("object_keys");
        let mut keys: Vec<String> = guard
            .inner
            .objects
            .iter()
            .map(|(_, o)| o.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Readback counters.
    pub fn pipeline_stats(&self) -> PipelineStats {
        self.lock("pipeline_stats").inner.pipeline.stats()
    }

    /// Hash of the synced scene, camera framing and frame size.
    ///
    /// Equal hashes mean a render would produce the same image.
    pub fn state_hash(&self) -> RenderResult<u64> {
        let guard = self.lock("state_hash");
        let inner = &*guard.inner;
        let mut hasher = StateHasher::new();
        hasher.write_size(inner.width, inner.height);
        if let Some(session) = inner.session.as_ref() {
            hasher.write_framing(&session.camera_framing());
        }
        let mut objects: Vec<&RegisteredObject> = inner.objects.iter().map(|(_, o)| o).collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        for obj in objects {
            hasher.write_object(&obj.key, &obj.snapshot)?;
        }
        Ok(hasher.finish())
    }

    /// Stop rendering, release every backend object and the session, and enter
    /// [`RenderState::Exiting`] for good. Safe to call more than once.
    pub fn teardown(&self) -> CleanupStats {
        let started = Instant::now();
        self.abort.raise();
        let mut guard = self
            .machine
            .lock(&self.inner, Some(RenderState::Exiting), "teardown");
        self.abort.clear();
        let inner = &mut *guard;

        let mut stats = CleanupStats::default();
        if let Some(mut session) = inner.session.take() {
            for (_, obj) in inner.objects.iter() {
                match session.remove_object(&obj.key) {
                    Ok(()) => stats.objects_released += 1,
                    Err(e) => {
                        tracing::warn!(key = %obj.key, "failed to release object: {e}");
                        stats.release_failures += 1;
                    }
                }
            }
            inner.progress.emit(
                ProgressPhase::RenderComplete,
                u64::from(inner.completion.current_iteration()),
                u64::from(inner.completion.current_iteration()),
                None,
            );
        }
        inner.objects.clear();
        inner.channels.free_pixels();
        inner.backplate = None;
        inner.synced = false;
        self.shared.clear_index();
        let _ = self.shared.tracker.drain();
        self.shared.dirty.store(false, Ordering::Release);

        stats.elapsed = started.elapsed();
        tracing::debug!(
            released = stats.objects_released,
            failures = stats.release_failures,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "render context torn down"
        );
        stats
    }

    /// Run [`RenderContext::teardown`] on a background thread.
    pub fn teardown_async(self: &Arc<Self>) -> RenderResult<CleanupHandle> {
        let ctx = Arc::clone(self);
        let join = std::thread::Builder::new()
            .name("render-context-cleanup".to_string())
            .spawn(move || ctx.teardown())
            .context("spawn scene cleanup thread")?;
        Ok(CleanupHandle::new(join))
    }
}

/// The context lock, held for several operations in a row.
///
/// Dropping the guard releases the lock.
pub struct ContextGuard<'a> {
    pub(crate) ctx: &'a RenderContext,
    pub(crate) inner: StateLock<'a, ContextInner>,
}

impl std::fmt::Debug for ContextGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard")
            .field("tag", &self.inner.tag())
            .field("inner", &*self.inner)
            .finish()
    }
}

impl ContextGuard<'_> {
    /// Label the lock was taken with.
    pub fn tag(&self) -> &'static str {
        self.inner.tag()
    }

    /// Drain the dirty tracker and push the changes into the backend scene.
    ///
    /// Work is staged first and committed only when every cancellation checkpoint passed;
    /// an abort or a failed commit puts the drained records back for the next call.
    /// Notifications that arrive meanwhile are queued for the next freshen. Changed settings
    /// are applied after the objects.
    #[tracing::instrument(skip_all, fields(tag = self.inner.tag()))]
    pub fn freshen(&mut self, cancelled: &dyn Fn() -> bool) -> RenderResult<Outcome<SyncReport>> {
        let ctx = self.ctx;
        let inner = &mut *self.inner;
        session_mut(&mut inner.session, "freshen")?;
        let _state = StateScope::enter(&ctx.machine, RenderState::Updating, "freshen")?;
        let _refresh = RefreshScope::enter(&ctx.shared);
        if cancelled() {
            return Ok(Outcome::Aborted);
        }

        ctx.shared.dirty.store(false, Ordering::Release);
        let batch = ctx.shared.tracker.drain();
        let plan = match stage(
            ctx.scene.as_ref(),
            &ctx.shared,
            &inner.objects,
            &batch,
            cancelled,
        ) {
            Outcome::Finished(plan) if !cancelled() => plan,
            _ => {
                tracing::debug!(pending = batch.len(), "freshen cancelled before commit");
                ctx.requeue(batch);
                return Ok(Outcome::Aborted);
            }
        };

        let mut report = match inner.commit(&ctx.shared, &plan) {
            Ok(report) => report,
            Err(e) => {
                ctx.requeue(batch);
                return Err(e.context("freshen"));
            }
        };
        if inner.settings_dirty {
            inner
                .apply_settings(ctx.render_type)
                .map_err(|e| e.context("apply settings"))?;
            report.settings_applied = true;
        }
        if report.changed() {
            inner.restart = true;
            ctx.needs_redraw.store(true, Ordering::Release);
        }
        inner.synced = true;
        inner.progress.emit(
            ProgressPhase::SyncComplete,
            plan.ops.len() as u64,
            plan.ops.len() as u64,
            None,
        );
        tracing::debug!(
            added = report.added,
            removed = report.removed,
            updated = report.updated,
            unchanged = report.unchanged,
            expired = report.expired,
            queued = ctx.shared.queued_during_refresh(),
            "scene synced"
        );
        Ok(Outcome::Finished(report))
    }

    /// Run one progressive step of up to `samples_per_update` iterations.
    ///
    /// Requires an initialized, freshened and sized context; otherwise returns
    /// [`RenderError::InvalidUsage`] and the state is left untouched. A pending restart
    /// clears the backend accumulation first. Pixels are not read back.
    #[tracing::instrument(skip_all, fields(tag = self.inner.tag()))]
    pub fn render(&mut self) -> RenderResult<Outcome<RenderPass>> {
        let ctx = self.ctx;
        let inner = &mut *self.inner;
        session_mut(&mut inner.session, "render")?;
        if !inner.synced {
            return Err(RenderError::invalid_usage("render called before freshen"));
        }
        if inner.width == 0 || inner.height == 0 {
            return Err(RenderError::invalid_usage("render called before resize"));
        }
        let _state = StateScope::enter(&ctx.machine, RenderState::Rendering, "render")?;
        let outcome = inner.render_pass(ctx.render_type)?;
        if let Outcome::Finished(pass) = &outcome
            && pass.iterations > 0
        {
            ctx.needs_redraw.store(true, Ordering::Release);
        }
        Ok(outcome)
    }

    /// Read every active channel from the backend. Returns how many were read.
    ///
    /// Channels the backend has no output for yet are skipped.
    pub fn read_frame_buffers(&mut self, flip: bool) -> RenderResult<usize> {
        let inner = &mut *self.inner;
        let options = read_options(&inner.settings, flip);
        let stamp = inner.stamp_info();
        let session = session_mut(&mut inner.session, "read_frame_buffers")?;
        inner
            .channels
            .read_frame_buffers(&mut inner.pipeline, session, &options, &stamp)
    }

    /// Read channel `id` and return a copy of its pixels.
    ///
    /// Reading a channel that is not active, or that the backend has no output for, is
    /// [`RenderError::InvalidUsage`].
    pub fn read_channel(&mut self, id: ChannelId, flip: bool) -> RenderResult<PixelBuffer> {
        let inner = &mut *self.inner;
        let name = id.descriptor().name;
        if !inner.channels.get(id).is_active() {
            return Err(RenderError::invalid_usage(format!(
                "channel {name} is not enabled"
            )));
        }
        let options = read_options(&inner.settings, flip);
        let options = if id == ChannelId::Color {
            options
        } else {
            ReadOptions {
                flip,
                resolve: options.resolve,
                ..ReadOptions::default()
            }
        };
        let stamp = inner.stamp_info();
        let session = session_mut(&mut inner.session, "read_channel")?;
        let channel = inner.channels.get_mut(id);
        let (frame_width, frame_height) = channel.frame_size();
        let request = ReadRequest {
            channel: id,
            region: channel.region(),
            frame_width,
            frame_height,
            options,
        };
        if !channel.read_frame_buffer(&mut inner.pipeline, session, &request, &stamp)? {
            return Err(RenderError::invalid_usage(format!(
                "channel {name} has no backend output to read"
            )));
        }
        channel.pixels().cloned().ok_or_else(|| {
            RenderError::invalid_usage(format!("channel {name} holds no pixels"))
        })
    }
}

impl RenderContext {
    fn requeue(&self, batch: DirtyBatch) {
        self.shared.tracker.requeue(batch);
        self.shared.dirty.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/context/render_context.rs"]
mod tests;
