/// Flat persistence blob for save/import/export
///
/// `{ "nodes": [...], "edges": [...], "metadata": {...} }`. Imports are
/// validated structurally before anything is deserialized, so one malformed
/// entry rejects the whole document.

use crate::workflow::types::{Edge, Graph, Node};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Document format version written into exported metadata
pub const DOCUMENT_VERSION: &str = "1.0";

/// Serialized workflow graph plus free-form metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Reasons a document import is rejected
#[derive(Debug, Error, PartialEq)]
pub enum ImportError {
    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("document is missing the '{0}' array")]
    MissingCollection(&'static str),

    #[error("node #{index} has invalid or missing '{field}'")]
    InvalidNode { index: usize, field: &'static str },

    #[error("edge #{index} has invalid or missing '{field}'")]
    InvalidEdge { index: usize, field: &'static str },

    #[error("document could not be decoded: {0}")]
    Decode(String),
}

impl WorkflowDocument {
    /// Export a graph snapshot with an export timestamp in the metadata
    pub fn from_graph(graph: &Graph) -> Self {
        let mut metadata = Map::new();
        metadata.insert("version".to_string(), json!(DOCUMENT_VERSION));
        metadata.insert("exportedAt".to_string(), json!(chrono::Utc::now().to_rfc3339()));

        Self {
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
            metadata,
        }
    }

    pub fn into_graph(self) -> Graph {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }

    /// Validate and decode an untrusted JSON value
    pub fn import(value: Value) -> Result<Self, ImportError> {
        validate(&value)?;
        serde_json::from_value(value).map_err(|e| ImportError::Decode(e.to_string()))
    }

    /// Validate and decode an untrusted JSON string
    pub fn import_str(raw: &str) -> Result<Self, ImportError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ImportError::Decode(e.to_string()))?;
        Self::import(value)
    }
}

fn validate(value: &Value) -> Result<(), ImportError> {
    let root = value.as_object().ok_or(ImportError::NotAnObject)?;

    let nodes = root
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or(ImportError::MissingCollection("nodes"))?;
    let edges = root
        .get("edges")
        .and_then(Value::as_array)
        .ok_or(ImportError::MissingCollection("edges"))?;

    for (index, node) in nodes.iter().enumerate() {
        let invalid = |field| ImportError::InvalidNode { index, field };
        if !is_string(node.get("id")) {
            return Err(invalid("id"));
        }
        if !is_string(node.get("type")) && !is_string(node.get("kind")) {
            return Err(invalid("type"));
        }
        if !node.get("position").is_some_and(Value::is_object) {
            return Err(invalid("position"));
        }
        if !node.get("data").is_some_and(Value::is_object) {
            return Err(invalid("data"));
        }
    }

    for (index, edge) in edges.iter().enumerate() {
        for field in ["id", "source", "target"] {
            if !is_string(edge.get(field)) {
                return Err(ImportError::InvalidEdge { index, field });
            }
        }
    }

    Ok(())
}

fn is_string(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_string)
}
