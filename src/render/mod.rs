//! Render loop building blocks shared by every context.

/// Backplate fitting and per-tile slicing.
pub mod backplate;
/// When a progressive render is done.
pub mod completion;
/// Pixel compositing and region copies.
pub mod composite;
/// Backend readback into channel pixels.
pub mod framebuffer;
/// Progress events.
pub mod progress;
/// Context state machine and its lock guard.
pub mod state;
/// Tile grid and the tile loop.
pub mod tiles;
