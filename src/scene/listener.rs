use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::scene::arena::ObjectHandle;
use crate::scene::dirty::DirtyTracker;
use crate::scene::graph::NodeId;

/// State shared between a render context and the scene callbacks feeding it.
#[derive(Debug, Default)]
pub(crate) struct SceneShared {
    pub(crate) tracker: DirtyTracker,
    index: RwLock<HashMap<NodeId, ObjectHandle>>,
    pub(crate) dirty: AtomicBool,
    pub(crate) in_refresh: AtomicBool,
    queued_during_refresh: AtomicU64,
}

impl SceneShared {
    pub(crate) fn handle_of(&self, node: NodeId) -> Option<ObjectHandle> {
        self.index.read().get(&node).copied()
    }

    pub(crate) fn register(&self, node: NodeId, handle: ObjectHandle) {
        self.index.write().insert(node, handle);
    }

    pub(crate) fn unregister(&self, node: NodeId) -> Option<ObjectHandle> {
        self.index.write().remove(&node)
    }

    pub(crate) fn clear_index(&self) {
        self.index.write().clear();
    }

    pub(crate) fn queued_during_refresh(&self) -> u64 {
        self.queued_during_refresh.load(Ordering::Relaxed)
    }

    fn note(&self) {
        self.dirty.store(true, Ordering::Release);
        if self.in_refresh.load(Ordering::Acquire) {
            self.queued_during_refresh.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Raises the in-refresh flag for the lifetime of a freshen call.
pub(crate) struct RefreshScope<'a>(&'a SceneShared);

impl<'a> RefreshScope<'a> {
    pub(crate) fn enter(shared: &'a SceneShared) -> Self {
        shared.in_refresh.store(true, Ordering::Release);
        Self(shared)
    }
}

impl Drop for RefreshScope<'_> {
    fn drop(&mut self) {
        self.0.in_refresh.store(false, Ordering::Release);
    }
}

/// Cloneable sink for host scene-graph change callbacks.
///
/// Calls only touch the dirty tracker's own lock and never block behind a running render.
/// Notifications that arrive while a freshen is in progress are queued for the next one.
#[derive(Clone, Debug)]
pub struct SceneListener {
    shared: Arc<SceneShared>,
}

impl SceneListener {
    pub(crate) fn new(shared: Arc<SceneShared>) -> Self {
        Self { shared }
    }

    /// A node was created in the host scene.
    pub fn node_added(&self, node: NodeId) {
        self.shared.tracker.mark_added(node);
        self.shared.note();
    }

    /// A node was deleted from the host scene.
    pub fn node_removed(&self, node: NodeId) {
        self.shared.tracker.mark_removed(node);
        self.shared.note();
    }

    /// Attributes of `node` changed.
    ///
    /// A node without a registered object is queued as an addition, since a freshen may be
    /// between reading its snapshot and registering it; the next freshen resolves it either way.
    pub fn node_changed(&self, node: NodeId) {
        match self.shared.handle_of(node) {
            Some(handle) => self.shared.tracker.mark_dirty(handle),
            None => self.shared.tracker.mark_added(node),
        }
        self.shared.note();
    }

    /// Mark a registered object dirty by handle.
    pub fn object_changed(&self, handle: ObjectHandle) {
        self.shared.tracker.mark_dirty(handle);
        self.shared.note();
    }

    /// Handle of the object registered for `node`, if any.
    pub fn handle_of(&self, node: NodeId) -> Option<ObjectHandle> {
        self.shared.handle_of(node)
    }
}
