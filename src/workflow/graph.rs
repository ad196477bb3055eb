/// Lock-free graph store using ArcSwap
///
/// Owns the canonical set of nodes and edges. Every mutation swaps the whole
/// snapshot pointer, so readers (the engine, timer ticks, API handlers) always
/// see a consistent graph without taking a lock.

use crate::workflow::types::{Edge, Graph, Node};
use arc_swap::ArcSwap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Position delta applied to duplicated nodes
pub const DUPLICATE_OFFSET: (f64, f64) = (50.0, 50.0);

/// Suffix appended to the label of a duplicated node
pub const COPY_SUFFIX: &str = " (copy)";

/// Canonical node/edge store with atomic snapshot swaps
#[derive(Debug, Default)]
pub struct GraphStore {
    /// Thread-safe atomic pointer to the current graph snapshot
    graph: ArcSwap<Graph>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: Graph) -> Self {
        Self {
            graph: ArcSwap::from_pointee(graph),
        }
    }

    /// Current snapshot (cheap Arc clone)
    pub fn snapshot(&self) -> Arc<Graph> {
        self.graph.load_full()
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.graph.load().node(id).cloned()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.graph.load().nodes.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.graph.load().edges.clone()
    }

    /// Targets of edges whose source is `id`, in edge-insertion order
    pub fn outgoing_targets(&self, id: &str) -> Vec<String> {
        self.graph.load().outgoing_targets(id)
    }

    pub fn add_node(&self, node: Node) {
        tracing::debug!("➕ Adding node '{}' ({})", node.id, node.kind);
        self.graph.rcu(|current| {
            let mut next = Graph::clone(current);
            next.nodes.push(node.clone());
            next
        });
    }

    pub fn add_edge(&self, edge: Edge) {
        tracing::debug!("🔗 Adding edge '{}': '{}' → '{}'", edge.id, edge.source, edge.target);
        self.graph.rcu(|current| {
            let mut next = Graph::clone(current);
            next.edges.push(edge.clone());
            next
        });
    }

    /// Bulk replace all nodes
    pub fn set_nodes(&self, nodes: Vec<Node>) {
        self.update_nodes(move |_| nodes.clone());
    }

    /// Bulk replace all edges
    pub fn set_edges(&self, edges: Vec<Edge>) {
        self.update_edges(move |_| edges.clone());
    }

    /// Functional update: `f` receives the current nodes and returns their replacement
    pub fn update_nodes<F>(&self, f: F)
    where
        F: Fn(&[Node]) -> Vec<Node>,
    {
        self.graph.rcu(|current| Graph {
            nodes: f(&current.nodes),
            edges: current.edges.clone(),
        });
    }

    /// Functional update: `f` receives the current edges and returns their replacement
    pub fn update_edges<F>(&self, f: F)
    where
        F: Fn(&[Edge]) -> Vec<Edge>,
    {
        self.graph.rcu(|current| Graph {
            nodes: current.nodes.clone(),
            edges: f(&current.edges),
        });
    }

    /// Replace the whole graph in one swap
    pub fn replace(&self, graph: Graph) {
        self.graph.store(Arc::new(graph));
    }

    /// Clone a node next to the original
    ///
    /// The copy keeps `data` (label gets a " (copy)" suffix), is offset by
    /// [`DUPLICATE_OFFSET`] and gets a fresh id derived from the original id and
    /// the current timestamp. Returns `None` when `id` is unknown.
    pub fn duplicate_node(&self, id: &str) -> Option<Node> {
        let stamp = chrono::Utc::now().timestamp_millis();
        let mut created = None;

        self.graph.rcu(|current| {
            let mut next = Graph::clone(current);
            created = None;

            let Some(original) = current.node(id) else {
                return next;
            };

            let mut copy = original.clone();
            copy.id = fresh_copy_id(&current.nodes, id, stamp);
            copy.position = original.position.offset(DUPLICATE_OFFSET.0, DUPLICATE_OFFSET.1);
            if let Some(label) = original.label() {
                copy.data.insert(
                    "label".to_string(),
                    Value::String(format!("{}{}", label, COPY_SUFFIX)),
                );
            }

            next.nodes.push(copy.clone());
            created = Some(copy);
            next
        });

        match &created {
            Some(copy) => tracing::info!("📄 Duplicated node '{}' as '{}'", id, copy.id),
            None => tracing::debug!("⏭️ Duplicate skipped, unknown node '{}'", id),
        }
        created
    }

    /// Remove a node and every edge where it is source or target
    ///
    /// Returns the removed node. Schedule cancellation is the engine's job and
    /// must happen before this call (see `ExecutionEngine::delete_node`).
    pub fn remove_node(&self, id: &str) -> Option<Node> {
        let mut removed = None;

        self.graph.rcu(|current| {
            removed = current.node(id).cloned();
            Graph {
                nodes: current.nodes.iter().filter(|node| node.id != id).cloned().collect(),
                edges: current.edges.iter().filter(|edge| !edge.touches(id)).cloned().collect(),
            }
        });

        if removed.is_some() {
            tracing::info!("🗑️ Removed node '{}' and its edges", id);
        }
        removed
    }

    /// Nodes with no incoming edges, in node order
    ///
    /// Builds a petgraph view of the snapshot; edges that reference unknown
    /// nodes are ignored.
    pub fn trigger_node_ids(&self) -> Vec<String> {
        let snapshot = self.graph.load();
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();

        for node in &snapshot.nodes {
            index_of.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
        }
        for edge in &snapshot.edges {
            if let (Some(&from), Some(&to)) = (
                index_of.get(edge.source.as_str()),
                index_of.get(edge.target.as_str()),
            ) {
                graph.add_edge(from, to, ());
            }
        }

        graph
            .externals(Direction::Incoming)
            .map(|index| graph[index].to_string())
            .collect()
    }
}

fn fresh_copy_id(nodes: &[Node], original_id: &str, stamp: i64) -> String {
    let base = format!("{}-{}", original_id, stamp);
    if nodes.iter().all(|node| node.id != base) {
        return base;
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{}-{}", base, counter);
        if nodes.iter().all(|node| node.id != candidate) {
            return candidate;
        }
        counter += 1;
    }
}
