/// Workflow Management Layer
///
/// This module handles the graph definition, persistence and the lock-free store.
/// It provides:
/// - Type definitions (Node, Edge, Graph)
/// - The ArcSwap-backed graph store with duplication and cascading deletion
/// - The flat JSON document used for save/import/export

// Core workflow type definitions
pub mod types;

// Lock-free graph store
pub mod graph;

// Import/export document and its validation
pub mod document;

// JSON file persistence for the document
pub mod storage;

// Re-export commonly used types
pub use document::{ImportError, WorkflowDocument};
pub use graph::GraphStore;
pub use storage::DocumentStorage;
pub use types::{Edge, Graph, Node, Position};
