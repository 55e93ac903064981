//! The render context orchestrator and the objects that travel with it.

/// Background teardown handles.
pub mod cleanup;
/// Scene export strategies.
pub mod export;
pub(crate) mod fingerprint;
/// Registry of live contexts by key.
pub mod registry;
/// Render context: session ownership, scene sync and the progressive render loop.
pub mod render_context;
/// Global render settings.
pub mod settings;
/// Tiled rendering of production frames.
pub mod tiled;
