use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::foundation::error::{RenderError, RenderResult};

/// Lifecycle state of a render context.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderState {
    /// Torn down. Terminal.
    Exiting = 0,
    /// Idle.
    Paused = 1,
    /// Inside a render call.
    Rendering = 2,
    /// Inside a scene sync or another mutating call.
    Updating = 3,
}

impl RenderState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Exiting,
            2 => Self::Rendering,
            3 => Self::Updating,
            _ => Self::Paused,
        }
    }
}

/// One recorded state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateTransition {
    /// State before the change.
    pub from: RenderState,
    /// State after the change.
    pub to: RenderState,
    /// Label of the call site that caused it.
    pub tag: &'static str,
}

const TRACE_CAPACITY: usize = 32;

#[derive(Debug, Default)]
struct Diagnostics {
    holder: Option<&'static str>,
    trace: VecDeque<StateTransition>,
}

/// Context state plus the diagnostics of whoever holds the context lock.
///
/// The state is readable at any time; it only changes through [`StateMachine::lock`] guards
/// or [`StateMachine::transition`], both of which run with the context lock held.
#[derive(Debug)]
pub struct StateMachine {
    state: AtomicU8,
    diag: Mutex<Diagnostics>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Machine in [`RenderState::Paused`].
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RenderState::Paused as u8),
            diag: Mutex::new(Diagnostics::default()),
        }
    }

    /// Current state.
    pub fn state(&self) -> RenderState {
        RenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn diag(&self) -> MutexGuard<'_, Diagnostics> {
        self.diag.lock()
    }

    /// Tag of the current lock holder, if any.
    pub fn holder(&self) -> Option<&'static str> {
        self.diag().holder
    }

    /// Most recent transitions, oldest first.
    pub fn recent_transitions(&self) -> Vec<StateTransition> {
        self.diag().trace.iter().copied().collect()
    }

    /// Move to `to`. Leaving [`RenderState::Exiting`] is refused and returns false.
    pub fn transition(&self, to: RenderState, tag: &'static str) -> bool {
        let from = self.state();
        if from == RenderState::Exiting && to != RenderState::Exiting {
            tracing::debug!(?to, tag, "ignoring transition out of Exiting");
            return false;
        }
        if from == to {
            return true;
        }
        self.state.store(to as u8, Ordering::Release);
        let mut diag = self.diag();
        if diag.trace.len() == TRACE_CAPACITY {
            diag.trace.pop_front();
        }
        diag.trace.push_back(StateTransition { from, to, tag });
        tracing::trace!(?from, ?to, tag, "state transition");
        true
    }

    /// Block until `mutex` is acquired, then enter `new_state` for the guard's lifetime.
    ///
    /// `None` takes the lock without touching the state.
    pub fn lock<'a, T>(
        &'a self,
        mutex: &'a Mutex<T>,
        new_state: Option<RenderState>,
        tag: &'static str,
    ) -> StateLock<'a, T> {
        let guard = mutex.lock();
        self.enter(guard, new_state, tag)
    }

    /// Like [`StateMachine::lock`], but give up after `timeout`.
    ///
    /// On timeout the current holder's tag is logged and named in the returned
    /// [`RenderError::InvalidUsage`].
    pub fn try_lock_for<'a, T>(
        &'a self,
        mutex: &'a Mutex<T>,
        new_state: Option<RenderState>,
        tag: &'static str,
        timeout: Duration,
    ) -> RenderResult<StateLock<'a, T>> {
        let Some(guard) = mutex.try_lock_for(timeout) else {
            let holder = self.holder().unwrap_or("unknown");
            tracing::warn!(tag, holder, ?timeout, "context lock timed out");
            return Err(RenderError::invalid_usage(format!(
                "lock '{tag}' timed out after {timeout:?}, held by '{holder}'"
            )));
        };
        Ok(self.enter(guard, new_state, tag))
    }

    fn enter<'a, T>(
        &'a self,
        guard: MutexGuard<'a, T>,
        new_state: Option<RenderState>,
        tag: &'static str,
    ) -> StateLock<'a, T> {
        let prior = self.state();
        self.diag().holder = Some(tag);
        let restore = match new_state {
            Some(s) if self.transition(s, tag) => Some(prior),
            _ => None,
        };
        StateLock {
            guard,
            machine: self,
            restore,
            tag,
        }
    }
}

/// Scoped hold on a context lock.
///
/// Derefs to the protected value. Dropping it restores the state it replaced, unless the
/// context has moved to [`RenderState::Exiting`] meanwhile.
#[must_use]
pub struct StateLock<'a, T> {
    guard: MutexGuard<'a, T>,
    machine: &'a StateMachine,
    restore: Option<RenderState>,
    tag: &'static str,
}

impl<T> StateLock<'_, T> {
    /// Label this guard was taken with.
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Move to `state` while the lock is held. The state restored on drop is unchanged.
    pub fn set_state(&mut self, state: RenderState) -> bool {
        let prior = self.machine.state();
        let changed = self.machine.transition(state, self.tag);
        if changed && self.restore.is_none() {
            self.restore = Some(prior);
        }
        changed
    }

    /// Machine this guard belongs to.
    pub fn machine(&self) -> &StateMachine {
        self.machine
    }
}

impl<T> Deref for StateLock<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for StateLock<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for StateLock<'_, T> {
    fn drop(&mut self) {
        if let Some(prior) = self.restore
            && self.machine.state() != RenderState::Exiting
        {
            self.machine.transition(prior, self.tag);
        }
        self.machine.diag().holder = None;
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StateLock<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLock")
            .field("tag", &self.tag)
            .field("restore", &self.restore)
            .field("value", &*self.guard)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/state.rs"]
mod tests;
