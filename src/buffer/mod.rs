/// Float RGBA pixel storage.
pub mod pixel_buffer;
