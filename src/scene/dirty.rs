use std::collections::BTreeSet;
use parking_lot::{Mutex, MutexGuard};

use crate::scene::arena::ObjectHandle;
use crate::scene::graph::NodeId;

/// Everything recorded since the previous drain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyBatch {
    /// Nodes created in the host scene, in arrival order.
    pub added: Vec<NodeId>,
    /// Nodes deleted from the host scene, in arrival order.
    pub removed: Vec<NodeId>,
    /// Registered objects whose attributes changed.
    pub dirty: Vec<ObjectHandle>,
}

impl DirtyBatch {
    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.dirty.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct DirtySets {
    added: Vec<NodeId>,
    removed: Vec<NodeId>,
    dirty: BTreeSet<ObjectHandle>,
}

impl DirtySets {
    // A node is pending in at most one of `added` and `removed`; the later record wins.
    fn add(&mut self, node: NodeId) {
        self.removed.retain(|n| *n != node);
        if !self.added.contains(&node) {
            self.added.push(node);
        }
    }

    // The node may have been synced in an earlier cycle, so the removal is always kept.
    // Freshen ignores removals of nodes it never registered.
    fn remove(&mut self, node: NodeId) {
        self.added.retain(|n| *n != node);
        if !self.removed.contains(&node) {
            self.removed.push(node);
        }
    }
}

/// Added, removed and dirty records guarded by a lock of their own.
///
/// Scene callbacks only ever touch this lock, so they never wait behind a render holding the
/// context lock.
#[derive(Debug, Default)]
pub struct DirtyTracker {
    sets: Mutex<DirtySets>,
}

impl DirtyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn sets(&self) -> MutexGuard<'_, DirtySets> {
        self.sets.lock()
    }

    /// Record that a registered object needs re-synchronisation.
    pub fn mark_dirty(&self, handle: ObjectHandle) {
        self.sets().dirty.insert(handle);
    }

    /// Record a node created in the host scene.
    pub fn mark_added(&self, node: NodeId) {
        self.sets().add(node);
    }

    /// Record a node deleted from the host scene.
    pub fn mark_removed(&self, node: NodeId) {
        self.sets().remove(node);
    }

    /// Take every record and leave the tracker empty, atomically.
    pub fn drain(&self) -> DirtyBatch {
        let mut sets = self.sets();
        let taken = std::mem::take(&mut *sets);
        DirtyBatch {
            added: taken.added,
            removed: taken.removed,
            dirty: taken.dirty.into_iter().collect(),
        }
    }

    /// Put a drained batch back in front of anything recorded since the drain.
    ///
    /// Records that arrived after the drain are replayed on top, so a later removal or
    /// re-addition of the same node overrides the drained record.
    pub fn requeue(&self, batch: DirtyBatch) {
        let mut sets = self.sets();
        let later = std::mem::take(&mut *sets);
        sets.removed = batch.removed;
        sets.added = batch.added;
        sets.dirty = batch.dirty.into_iter().collect();
        for node in later.removed {
            sets.remove(node);
        }
        for node in later.added {
            sets.add(node);
        }
        sets.dirty.extend(later.dirty);
    }

    /// Number of pending records.
    pub fn pending(&self) -> usize {
        let sets = self.sets();
        sets.added.len() + sets.removed.len() + sets.dirty.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/dirty.rs"]
mod tests;
