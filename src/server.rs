/// Server setup and initialization
///
/// Wires together all components: document storage, graph store, status
/// tracker, relay channel, execution engine, and HTTP routes.

use crate::{
    api::{create_api_routes, AppState},
    config::Config,
    relay::{RelayChannel, RelayExecutor, TcpConnector},
    runtime::{ExecutionEngine, ExecutorRegistry, StatusTracker},
    workflow::{types::WEBHOOK_KIND, DocumentStorage, GraphStore},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the shared application state from configuration
///
/// Loads the stored workflow document if there is one; a missing document
/// starts an empty graph, an invalid one is a startup error.
pub async fn create_state(config: &Config) -> Result<AppState> {
    tracing::info!("📋 Initializing document storage at {}", config.storage.document_path);
    let storage = DocumentStorage::new(&config.storage.document_path);

    tracing::info!("📊 Initializing graph store");
    let graph = match storage.load().await? {
        Some(document) => GraphStore::from_graph(document.into_graph()),
        None => {
            tracing::info!("📭 No stored workflow document, starting with an empty graph");
            GraphStore::new()
        }
    };

    let statuses = Arc::new(StatusTracker::new());

    tracing::info!("🔌 Initializing relay channel for {}", config.relay.address);
    let relay = RelayChannel::new(
        Arc::new(TcpConnector::new(config.relay.address.clone())),
        config.relay.clone(),
        Arc::clone(&statuses),
    );

    let executors = ExecutorRegistry::new()
        .with(WEBHOOK_KIND, Arc::new(RelayExecutor::new(relay.clone())));

    tracing::info!("🚀 Initializing execution engine");
    let engine = ExecutionEngine::new(
        Arc::new(graph),
        statuses,
        executors,
        config.engine.clone(),
    );

    Ok(AppState {
        engine,
        relay,
        storage,
    })
}

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    let state = create_state(&config).await?;

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes().with_state(state));

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting flowcore server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Node, WorkflowDocument};
    use crate::workflow::types::Graph;

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.storage.document_path = dir.path().join("wf.json").display().to_string();
        config
    }

    #[tokio::test]
    async fn state_starts_empty_without_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_state(&config_in(&dir)).await.unwrap();
        assert!(state.engine.graph().nodes().is_empty());
    }

    #[tokio::test]
    async fn state_loads_the_stored_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let graph = Graph {
            nodes: vec![Node::new("saved", "http")],
            edges: vec![],
        };
        DocumentStorage::new(&config.storage.document_path)
            .save(&WorkflowDocument::from_graph(&graph))
            .await
            .unwrap();

        let state = create_state(&config).await.unwrap();
        assert!(state.engine.graph().node("saved").is_some());
    }

    #[tokio::test]
    async fn corrupt_document_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        tokio::fs::write(&config.storage.document_path, "{\"nodes\": 3}").await.unwrap();

        assert!(create_state(&config).await.is_err());
    }
}
