//! Image file collaborators: the writer seam and decoding of input images.

/// Decoding of backplate and other input images.
pub mod decode;
/// Writer trait, the `image`-backed writer and an in-memory writer.
pub mod writer;
