use xxhash_rust::xxh3::Xxh3;

use crate::backend::session::{CameraFraming, Projection};
use crate::foundation::error::{RenderError, RenderResult};
use crate::scene::graph::ObjectSnapshot;

const XXH3_SEED: u64 = 0x5f3c_a1d2_9e47_b086;

/// Stable hash over the synced scene and camera, for callers that skip redundant work.
pub(crate) struct StateHasher {
    inner: Xxh3,
}

impl StateHasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    /// Objects must arrive in a stable order.
    pub(crate) fn write_object(&mut self, key: &str, snapshot: &ObjectSnapshot) -> RenderResult<()> {
        self.write_str(key);
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| RenderError::serde(format!("hash object '{key}': {e}")))?;
        self.write_u32(bytes.len() as u32);
        self.write_bytes(&bytes);
        Ok(())
    }

    pub(crate) fn write_framing(&mut self, framing: &CameraFraming) {
        match framing.projection {
            Projection::Perspective { sensor } => {
                self.write_u32(0);
                self.write_f32(sensor[0]);
                self.write_f32(sensor[1]);
            }
            Projection::Orthographic { width, height } => {
                self.write_u32(1);
                self.write_f32(width);
                self.write_f32(height);
            }
        }
        self.write_f32(framing.lens_shift[0]);
        self.write_f32(framing.lens_shift[1]);
    }

    pub(crate) fn write_size(&mut self, width: u32, height: u32) {
        self.write_u32(width);
        self.write_u32(height);
    }

    pub(crate) fn finish(self) -> u64 {
        self.inner.digest()
    }
}
