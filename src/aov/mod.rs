//! Output channels (AOVs): catalogue, storage, readback and post-processing.

/// Channel catalogue and one channel's pixels.
pub mod channel;
/// Every channel of one context.
pub mod channel_set;
/// Depth normalization.
pub mod depth;
/// Render stamp overlay.
pub mod stamp;
