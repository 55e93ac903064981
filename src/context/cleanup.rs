use std::thread::JoinHandle;
use std::time::Duration;

use crate::foundation::error::{RenderError, RenderResult};

/// What a teardown released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Backend objects removed.
    pub objects_released: usize,
    /// Backend removals that failed and were skipped.
    pub release_failures: usize,
    /// Wall-clock time the teardown took.
    pub elapsed: Duration,
}

/// Handle on a teardown running in the background.
#[derive(Debug)]
pub struct CleanupHandle {
    join: JoinHandle<CleanupStats>,
}

impl CleanupHandle {
    pub(crate) fn new(join: JoinHandle<CleanupStats>) -> Self {
        Self { join }
    }

    /// True once the teardown has finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the teardown has finished.
    pub fn wait(self) -> RenderResult<CleanupStats> {
        self.join
            .join()
            .map_err(|_| RenderError::backend("scene cleanup task panicked"))
    }
}
