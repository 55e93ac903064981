use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};
use crate::scene::graph::{AttributeValue, NodeId, ObjectSnapshot, SceneGraph};
use crate::scene::listener::SceneListener;

/// Serializable scene description used by the CLI and tests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Objects in declaration order.
    #[serde(default)]
    pub objects: Vec<SceneObjectDesc>,
}

/// One object of a [`SceneDocument`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneObjectDesc {
    /// Identity string, unique within the document.
    pub name: String,
    /// Attribute values.
    #[serde(default)]
    pub attributes: ObjectSnapshot,
}

impl SceneDocument {
    /// Parse a document from JSON text.
    pub fn from_json_str(s: &str) -> RenderResult<Self> {
        serde_json::from_str(s).map_err(|e| RenderError::serde(format!("scene document: {e}")))
    }

    /// Load a document from a JSON file.
    pub fn from_path(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read scene '{}'", path.display()))?;
        Self::from_json_str(&text)
    }
}

#[derive(Clone, Debug)]
struct MemoryNode {
    identity: String,
    attributes: ObjectSnapshot,
    renderable: bool,
}

/// Thread-safe in-memory [`SceneGraph`].
///
/// Once a listener is attached every edit is forwarded to it, the way a host would wire its
/// node callbacks.
#[derive(Debug, Default)]
pub struct MemoryScene {
    nodes: RwLock<BTreeMap<NodeId, MemoryNode>>,
    next_id: AtomicU64,
    listener: RwLock<Option<SceneListener>>,
}

impl MemoryScene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scene holding every object of `doc`.
    pub fn from_document(doc: &SceneDocument) -> Self {
        let scene = Self::new();
        for obj in &doc.objects {
            scene.add_node(&obj.name, obj.attributes.clone());
        }
        scene
    }

    /// Forward future edits to `listener`.
    pub fn attach(&self, listener: SceneListener) {
        *self.listener.write() = Some(listener);
    }

    fn notify(&self, f: impl FnOnce(&SceneListener)) {
        if let Some(l) = self.listener.read().as_ref() {
            f(l);
        }
    }

    /// Insert a node and return its handle.
    pub fn add_node(&self, identity: &str, attributes: ObjectSnapshot) -> NodeId {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.nodes.write().insert(
            id,
            MemoryNode {
                identity: identity.to_string(),
                attributes,
                renderable: true,
            },
        );
        self.notify(|l| l.node_added(id));
        id
    }

    /// Set one attribute. Returns false when the node does not exist.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: AttributeValue) -> bool {
        let found = match self.nodes.write().get_mut(&node) {
            Some(n) => {
                n.attributes.insert(name.to_string(), value);
                true
            }
            None => false,
        };
        if found {
            self.notify(|l| l.node_changed(node));
        }
        found
    }

    /// Toggle whether the node contributes to rendering.
    pub fn set_renderable(&self, node: NodeId, renderable: bool) {
        if let Some(n) = self.nodes.write().get_mut(&node) {
            n.renderable = renderable;
        }
    }

    /// Delete a node. Returns false when it did not exist.
    pub fn remove_node(&self, node: NodeId) -> bool {
        let removed = self.nodes.write().remove(&node).is_some();
        if removed {
            self.notify(|l| l.node_removed(node));
        }
        removed
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// True when the scene holds no node.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SceneGraph for MemoryScene {
    fn nodes(&self) -> Vec<NodeId> {
        self.nodes.read().keys().copied().collect()
    }

    fn identity(&self, node: NodeId) -> Option<String> {
        self.nodes.read().get(&node).map(|n| n.identity.clone())
    }

    fn attribute_names(&self, node: NodeId) -> Vec<String> {
        self.nodes
            .read()
            .get(&node)
            .map(|n| n.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<AttributeValue> {
        self.nodes.read().get(&node).and_then(|n| n.attributes.get(name).cloned())
    }

    fn affects_render(&self, node: NodeId) -> bool {
        self.nodes.read().get(&node).is_some_and(|n| n.renderable)
    }

    fn snapshot(&self, node: NodeId) -> Option<(String, ObjectSnapshot)> {
        self.nodes.read().get(&node).map(|n| (n.identity.clone(), n.attributes.clone()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/memory.rs"]
mod tests;
