/// Core workflow type definitions
///
/// Defines the fundamental structures for graphs, nodes and edges. These types
/// are serialized/deserialized from JSON for import, export and the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node kind that arms a recurring timer to re-trigger its downstream neighbours
pub const SCHEDULE_KIND: &str = "schedule";

/// Node kind whose execution is a round-trip through the webhook relay
pub const WEBHOOK_KIND: &str = "webhook";

/// Canvas position of a node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Return a copy shifted by the given delta
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

/// A single node in the workflow graph
///
/// `data` is opaque to the engine except for the schedule fields
/// (`active`, `intervalValue`, `intervalUnit`, `initialBehavior`) and `label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the graph (e.g., "schedule-1")
    pub id: String,
    /// Node kind which selects the executor (e.g., "schedule", "webhook", "http")
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
    /// Node-specific configuration as flexible JSON
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position: Position::default(),
            data: Map::new(),
        }
    }

    /// Builder-style helper to set a data field
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn is_schedule(&self) -> bool {
        self.kind == SCHEDULE_KIND
    }

    /// Display label, if the node carries one
    pub fn label(&self) -> Option<&str> {
        self.data.get("label").and_then(Value::as_str)
    }
}

/// Connection between two nodes in the workflow graph
///
/// Edges define the fan-out direction from one node to another. Their order
/// in the store is the order downstream neighbours run in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Whether this edge touches the given node on either end
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Immutable snapshot of nodes and edges held by the graph store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Targets of every edge leaving `id`, in edge order
    pub fn outgoing_targets(&self, id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|edge| edge.source == id)
            .map(|edge| edge.target.clone())
            .collect()
    }
}

/// JavaScript-style truthiness for loosely typed form values
///
/// `null`, `false`, `0`, `""` and missing values are falsy; everything else is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_kind_serializes_as_type_and_accepts_kind_alias() {
        let node = Node::new("a", "http");
        let encoded = serde_json::to_value(&node).unwrap();
        assert_eq!(encoded["type"], "http");

        let decoded: Node = serde_json::from_value(json!({
            "id": "b", "kind": "email", "position": {"x": 1.0, "y": 2.0}, "data": {}
        }))
        .unwrap();
        assert_eq!(decoded.kind, "email");
        assert_eq!(decoded.position, Position { x: 1.0, y: 2.0 });
    }

    #[test]
    fn truthiness_follows_form_semantics() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("yes"))));
        assert!(is_truthy(Some(&json!(3))));
    }

    #[test]
    fn outgoing_targets_keep_edge_order() {
        let graph = Graph {
            nodes: vec![Node::new("a", "x"), Node::new("b", "x"), Node::new("c", "x")],
            edges: vec![
                Edge::new("e1", "a", "c"),
                Edge::new("e2", "b", "c"),
                Edge::new("e3", "a", "b"),
            ],
        };
        assert_eq!(graph.outgoing_targets("a"), vec!["c", "b"]);
        assert!(graph.outgoing_targets("c").is_empty());
    }
}
