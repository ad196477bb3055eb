/// Graph editing REST API endpoints
///
/// Every successful mutation is persisted to the document store before the
/// response is sent.

use crate::{
    api::AppState,
    workflow::{Edge, Node, WorkflowDocument},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Response for node mutations
#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub node: Node,
    pub message: String,
}

/// Create graph editing routes
pub fn create_graph_routes() -> Router<AppState> {
    Router::new()
        .route("/api/graph", get(export_graph).put(import_graph))
        .route("/api/nodes", post(add_node))
        .route("/api/edges", post(add_edge))
        .route("/api/nodes/{id}/duplicate", post(duplicate_node))
        .route("/api/nodes/{id}", delete(delete_node))
}

/// Export the current graph as a document
///
/// GET /api/graph
pub async fn export_graph(State(state): State<AppState>) -> Json<WorkflowDocument> {
    Json(WorkflowDocument::from_graph(&state.engine.graph().snapshot()))
}

/// Replace the whole graph with an imported document
///
/// PUT /api/graph
/// Body: { "nodes": [...], "edges": [...], "metadata": {...} }
/// A malformed document is rejected with 400 and leaves the graph untouched.
pub async fn import_graph(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let document = match WorkflowDocument::import(payload) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!("❌ Rejected workflow import: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    state.engine.stop_execution();
    let (nodes, edges) = (document.nodes.len(), document.edges.len());
    state.engine.graph().replace(document.into_graph());
    state.persist().await?;

    tracing::info!("📥 Imported workflow with {} nodes and {} edges", nodes, edges);
    Ok(Json(json!({ "nodes": nodes, "edges": edges })))
}

/// Add a node
///
/// POST /api/nodes
/// Body: { "id": "...", "type": "...", "position": {...}, "data": {...} }
pub async fn add_node(
    State(state): State<AppState>,
    Json(node): Json<Node>,
) -> Result<Json<NodeResponse>, StatusCode> {
    if node.id.is_empty() || node.kind.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if state.engine.graph().node(&node.id).is_some() {
        return Err(StatusCode::CONFLICT);
    }

    state.engine.graph().add_node(node.clone());
    state.persist().await?;

    Ok(Json(NodeResponse {
        message: format!("Node '{}' added", node.id),
        node,
    }))
}

/// Add an edge between two existing nodes
///
/// POST /api/edges
/// Body: { "id": "...", "source": "...", "target": "..." }
pub async fn add_edge(
    State(state): State<AppState>,
    Json(edge): Json<Edge>,
) -> Result<Json<Edge>, StatusCode> {
    if edge.id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let graph = state.engine.graph();
    if graph.node(&edge.source).is_none() || graph.node(&edge.target).is_none() {
        tracing::warn!("❌ Edge '{}' references an unknown node", edge.id);
        return Err(StatusCode::NOT_FOUND);
    }

    graph.add_edge(edge.clone());
    state.persist().await?;
    Ok(Json(edge))
}

/// Duplicate a node next to the original
///
/// POST /api/nodes/{id}/duplicate
pub async fn duplicate_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, StatusCode> {
    let Some(copy) = state.engine.graph().duplicate_node(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    state.persist().await?;

    tracing::info!("📋 Duplicated node '{}' as '{}'", id, copy.id);
    Ok(Json(NodeResponse {
        message: format!("Node '{}' duplicated", id),
        node: copy,
    }))
}

/// Delete a node, its schedule and its incident edges
///
/// DELETE /api/nodes/{id}
pub async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, StatusCode> {
    let Some(removed) = state.engine.delete_node(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    state.relay.forget(&id);
    state.persist().await?;

    tracing::info!("🗑️ Deleted node '{}'", id);
    Ok(Json(NodeResponse {
        message: format!("Node '{}' deleted", id),
        node: removed,
    }))
}
