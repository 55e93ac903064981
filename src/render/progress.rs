use std::sync::Arc;
use std::time::Instant;

/// Phase a progress event reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    /// A scene sync began.
    SyncStarted,
    /// One object is about to be pushed to the backend.
    ObjectPreSync,
    /// One object was pushed to the backend.
    ObjectSyncComplete,
    /// The scene sync finished.
    SyncComplete,
    /// The first pass of a render session is about to run.
    RenderStart,
    /// A render pass is about to run.
    RenderPassStarted,
    /// The completion criteria were met, or the context was torn down.
    RenderComplete,
}

/// Structured progress notification. Carries no control flow back into the orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    /// What happened.
    pub phase: ProgressPhase,
    /// Index of the current item within the phase.
    pub current_index: u64,
    /// Items in the phase.
    pub total_count: u64,
    /// Milliseconds since the reporter was created or reset.
    pub elapsed_ms: u64,
    /// Object identity for the per-object phases.
    pub object_name: Option<String>,
}

impl ProgressEvent {
    /// `current_index` as a percentage of `total_count`; 100 when there is nothing to count.
    pub fn percent(&self) -> u32 {
        if self.total_count == 0 {
            return 100;
        }
        (self.current_index.min(self.total_count) * 100 / self.total_count) as u32
    }
}

/// Caller-supplied progress sink.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Stamps and forwards progress events to an optional callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    epoch: Instant,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self {
            callback: None,
            epoch: Instant::now(),
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl ProgressReporter {
    /// Reporter forwarding to `callback`.
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            ..Self::default()
        }
    }

    /// Replace the callback.
    pub fn set_callback(&mut self, callback: Option<ProgressCallback>) {
        self.callback = callback;
    }

    /// Restart the elapsed-time clock.
    pub fn reset_clock(&mut self) {
        self.epoch = Instant::now();
    }

    /// Emit one event. A no-op without a callback.
    pub fn emit(
        &self,
        phase: ProgressPhase,
        current_index: u64,
        total_count: u64,
        object_name: Option<&str>,
    ) {
        let Some(cb) = &self.callback else {
            return;
        };
        cb(&ProgressEvent {
            phase,
            current_index,
            total_count,
            elapsed_ms: self.epoch.elapsed().as_millis() as u64,
            object_name: object_name.map(str::to_string),
        });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/progress.rs"]
mod tests;
