/// HTTP API Layer
///
/// This module provides the REST control surface over one in-process graph:
/// - Graph editing (nodes, edges, duplicate, delete, import/export)
/// - Execution control (run, stop, status)
/// - Webhook relay registration and execution

use crate::{
    relay::RelayChannel,
    runtime::ExecutionEngine,
    workflow::{DocumentStorage, WorkflowDocument},
};
use axum::{http::StatusCode, Router};

// Graph editing and document import/export
pub mod graph;

// Execute / stop / status endpoints
pub mod execution;

// Relay registration endpoints
pub mod webhooks;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Execution engine (owns the graph store and status tracker handles)
    pub engine: ExecutionEngine,
    /// Channel to the external webhook relay
    pub relay: RelayChannel,
    /// Flat document persistence
    pub storage: DocumentStorage,
}

impl AppState {
    /// Write the current graph to storage
    ///
    /// Handlers call this after every successful mutation; failures are
    /// logged and reported as 500.
    pub async fn persist(&self) -> Result<(), StatusCode> {
        let document = WorkflowDocument::from_graph(&self.engine.graph().snapshot());
        self.storage.save(&document).await.map_err(|e| {
            tracing::error!("Failed to persist workflow document: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// Every API route, ready for `.with_state(...)`
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(graph::create_graph_routes())
        .merge(execution::create_execution_routes())
        .merge(webhooks::create_webhook_routes())
}
