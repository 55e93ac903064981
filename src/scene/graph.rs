use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Host-side handle of a scene-graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Attribute value read from the host scene graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Two-component vector.
    Vec2([f64; 2]),
    /// Linear RGB colour.
    Color([f32; 3]),
    /// Free-form string.
    Text(String),
}

impl AttributeValue {
    /// Numeric view of scalar values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Bool(v) => Some(f64::from(u8::from(*v))),
            _ => None,
        }
    }

    /// Boolean view; numbers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            Self::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    /// Vector view.
    pub fn as_vec2(&self) -> Option<[f64; 2]> {
        match self {
            Self::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    /// Colour view; scalars broadcast to grey.
    pub fn as_color(&self) -> Option<[f32; 3]> {
        match self {
            Self::Color(c) => Some(*c),
            Self::Float(v) => Some([*v as f32; 3]),
            _ => None,
        }
    }

    /// String view.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// All attributes of one node, keyed by attribute name.
pub type ObjectSnapshot = BTreeMap<String, AttributeValue>;

/// The four operations the orchestrator needs from a host scene graph.
///
/// Change notifications flow the other way: the host forwards its callbacks into a
/// [`crate::SceneListener`] obtained from the render context.
pub trait SceneGraph: Send + Sync {
    /// Enumerate every node currently in the scene.
    fn nodes(&self) -> Vec<NodeId>;

    /// Stable identity string of `node`, or `None` when the node no longer exists.
    fn identity(&self, node: NodeId) -> Option<String>;

    /// Names of the attributes `node` exposes.
    fn attribute_names(&self, node: NodeId) -> Vec<String>;

    /// Read one attribute by name.
    fn attribute(&self, node: NodeId, name: &str) -> Option<AttributeValue>;

    /// Whether edits to `node` can change the rendered image.
    fn affects_render(&self, _node: NodeId) -> bool {
        true
    }

    /// Identity and full attribute snapshot of `node`, or `None` once it is gone.
    fn snapshot(&self, node: NodeId) -> Option<(String, ObjectSnapshot)> {
        let identity = self.identity(node)?;
        let attrs = self
            .attribute_names(node)
            .into_iter()
            .filter_map(|name| self.attribute(node, &name).map(|v| (name, v)))
            .collect();
        Some((identity, attrs))
    }
}
