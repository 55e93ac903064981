use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::session::RenderBackend;
use crate::context::cleanup::{CleanupHandle, CleanupStats};
use crate::context::render_context::{RenderContext, RenderType};
use crate::foundation::error::{RenderError, RenderResult};
use crate::scene::graph::SceneGraph;

/// Live render contexts by caller-chosen key, e.g. one per viewport panel.
///
/// Removing a context tears it down in the background. Creating a context under a key whose
/// previous owner is still tearing down waits for that teardown first.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: Mutex<HashMap<String, Arc<RenderContext>>>,
    pending: Mutex<HashMap<String, CleanupHandle>>,
}

impl ContextRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context and register it under `key`.
    pub fn create(
        &self,
        key: &str,
        backend: Arc<dyn RenderBackend>,
        scene: Arc<dyn SceneGraph>,
        render_type: RenderType,
    ) -> RenderResult<Arc<RenderContext>> {
        self.wait_for(key)?;
        let ctx = Arc::new(RenderContext::new(backend, scene, render_type));
        self.insert(key, Arc::clone(&ctx))?;
        Ok(ctx)
    }

    /// Register an existing context. Fails when `key` is taken.
    pub fn insert(&self, key: &str, ctx: Arc<RenderContext>) -> RenderResult<()> {
        let mut contexts = self.contexts.lock();
        if contexts.contains_key(key) {
            return Err(RenderError::invalid_usage(format!(
                "a render context is already registered as '{key}'"
            )));
        }
        contexts.insert(key.to_string(), ctx);
        Ok(())
    }

    /// Context registered as `key`.
    pub fn get(&self, key: &str) -> Option<Arc<RenderContext>> {
        self.contexts.lock().get(key).cloned()
    }

    /// Unregister `key` and tear its context down on a background thread.
    ///
    /// Returns `false` when nothing was registered under `key`.
    pub fn remove(&self, key: &str) -> RenderResult<bool> {
        let Some(ctx) = self.contexts.lock().remove(key) else {
            return Ok(false);
        };
        let handle = ctx.teardown_async()?;
        if let Some(previous) = self.pending.lock().insert(key.to_string(), handle) {
            previous.wait()?;
        }
        tracing::debug!(key, "render context scheduled for teardown");
        Ok(true)
    }

    /// Block until a pending teardown for `key`, if any, has finished.
    pub fn wait_for(&self, key: &str) -> RenderResult<Option<CleanupStats>> {
        let handle = self.pending.lock().remove(key);
        handle.map(CleanupHandle::wait).transpose()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.contexts.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered contexts.
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// True when no context is registered.
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /// Tear every context down and wait for all teardowns, including earlier ones.
    pub fn clear(&self) -> RenderResult<Vec<CleanupStats>> {
        let drained: Vec<Arc<RenderContext>> =
            self.contexts.lock().drain().map(|(_, ctx)| ctx).collect();
        let mut stats: Vec<CleanupStats> = drained.iter().map(|ctx| ctx.teardown()).collect();
        let pending: Vec<CleanupHandle> = self.pending.lock().drain().map(|(_, h)| h).collect();
        for handle in pending {
            stats.push(handle.wait()?);
        }
        Ok(stats)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/context/registry.rs"]
mod tests;
