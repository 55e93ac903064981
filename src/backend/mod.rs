//! Render backend seam and the CPU reference implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Deterministic CPU backend.
pub mod cpu;
/// Backend and session traits plus the values passed across them.
pub mod session;

use crate::backend::cpu::{CpuBackend, CpuBackendOpts};
use crate::backend::session::RenderBackend;

/// Backends this crate can construct by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// [`CpuBackend`].
    #[default]
    Cpu,
}

/// Build a backend of `kind`.
pub fn create_backend(kind: BackendKind, opts: CpuBackendOpts) -> Arc<dyn RenderBackend> {
    match kind {
        BackendKind::Cpu => Arc::new(CpuBackend::new(opts)),
    }
}
