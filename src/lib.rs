//! Render context orchestration for progressive ray-tracing backends.
//!
//! A [`RenderContext`] owns one backend session and keeps it in step with a live host scene
//! graph that may be edited from other threads. The lifecycle is:
//!
//! - [`RenderContext::initialize`] the backend session and [`RenderContext::resize`] it
//! - [`RenderContext::freshen`] to push queued scene changes into the backend
//! - [`RenderContext::render`] progressive passes, or [`RenderContext::render_tiles`]
//! - [`RenderContext::read_frame_buffers`] and [`RenderContext::save_to_file`]
//! - [`RenderContext::teardown`], possibly in the background through a [`ContextRegistry`]
//!
//! Cancellation is not an error: long-running calls return [`Outcome::Aborted`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Output channels (AOVs).
pub mod aov;
/// Backend seam and the CPU reference backend.
pub mod backend;
/// Pixel storage.
pub mod buffer;
/// Render contexts, their registry and settings.
pub mod context;
/// Image file collaborators.
pub mod encode;
/// Render loop building blocks.
pub mod render;
/// Host scene-graph contract and change tracking.
pub mod scene;

pub use crate::foundation::core::{Outcome, RenderRegion, Rgba32F};
pub use crate::foundation::error::{RenderError, RenderResult};

pub use crate::aov::channel::{ChannelDescriptor, ChannelId};
pub use crate::backend::cpu::{CpuBackend, CpuBackendOpts};
pub use crate::backend::session::{
    BackendSession, CameraFraming, CreationFlags, DeviceKind, PostEffect, Projection,
    RenderBackend, RenderQuality,
};
pub use crate::backend::{BackendKind, create_backend};
pub use crate::buffer::pixel_buffer::PixelBuffer;
pub use crate::context::cleanup::{CleanupHandle, CleanupStats};
pub use crate::context::export::{SceneExport, SceneExporter};
pub use crate::context::registry::ContextRegistry;
pub use crate::context::render_context::{
    ContextGuard, RenderContext, RenderPass, RenderType, SyncReport, THUMBNAIL_ITERATIONS,
};
pub use crate::context::settings::RenderSettings;
pub use crate::context::tiled::TileAccumulators;
pub use crate::encode::writer::{
    ImageFileDescription, ImageFileWriter, ImageFormat, ImageWriter, InMemoryWriter,
};
pub use crate::render::completion::{CompletionCriteriaParams, CompletionMode};
pub use crate::render::progress::{ProgressCallback, ProgressEvent, ProgressPhase};
pub use crate::render::state::RenderState;
pub use crate::render::tiles::{TileProgress, TileStats};
pub use crate::scene::arena::ObjectHandle;
pub use crate::scene::graph::{AttributeValue, NodeId, ObjectSnapshot, SceneGraph};
pub use crate::scene::listener::SceneListener;
pub use crate::scene::memory::{MemoryScene, SceneDocument};
