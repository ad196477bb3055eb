/// Execution control endpoints
///
/// Runs are started in the background; progress is observed through
/// `/api/status` or the `/api/status/events` stream.

use crate::{
    api::AppState,
    runtime::{StatusEntry, StatusEvent},
    relay::ConnectionState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast::error::RecvError;

/// Request body for starting a run
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// Start nodes in order; empty runs every trigger node
    #[serde(default)]
    pub start_ids: Vec<String>,
}

/// Snapshot of engine and relay state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub running: bool,
    pub executing: Vec<String>,
    pub scheduled: Vec<String>,
    pub nodes: HashMap<String, StatusEntry>,
    pub relay: ConnectionState,
}

pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/api/execute", post(execute))
        .route("/api/stop", post(stop))
        .route("/api/status", get(status))
        .route("/api/status/events", get(status_events))
}

/// Start a workflow run
///
/// POST /api/execute
/// Body: { "startIds": ["..."] } (optional)
pub async fn execute(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<StatusResponse>), StatusCode> {
    let request: ExecuteRequest = if body.trim().is_empty() {
        ExecuteRequest::default()
    } else {
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("❌ Invalid execute request: {}", e);
            StatusCode::BAD_REQUEST
        })?
    };
    tracing::info!("🚀 Execution requested from {:?}", request.start_ids);

    // stop synchronously so the returned snapshot already reflects the reset
    state.engine.stop_execution();
    let engine = state.engine.clone();
    tokio::spawn(async move {
        engine.execute_workflow(&request.start_ids).await;
    });

    Ok((StatusCode::ACCEPTED, Json(snapshot(&state))))
}

/// Stop everything: timers, in-flight steps, statuses back to idle
///
/// POST /api/stop
pub async fn stop(State(state): State<AppState>) -> Json<StatusResponse> {
    state.engine.stop_execution();
    Json(snapshot(&state))
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(snapshot(&state))
}

/// Server-sent stream of status changes
///
/// GET /api/status/events
pub async fn status_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = stream::unfold(state.engine.subscribe(), |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => return Some((to_sse(&event), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("⚠️ Status stream lagged, {} event(s) skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &StatusEvent) -> Result<Event, axum::Error> {
    Event::default().event("status").json_data(event)
}

fn snapshot(state: &AppState) -> StatusResponse {
    StatusResponse {
        running: state.engine.is_running(),
        executing: state.engine.executing_node_ids(),
        scheduled: state.engine.scheduled_node_ids(),
        nodes: state.engine.status_snapshot(),
        relay: state.relay.state(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{state_in, state_with, Unreachable};
    use crate::runtime::{ExecutorRegistry, FnExecutor, Invocation, NodeStatus};
    use crate::workflow::{Edge, Node};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_for(state: &AppState, node: &str, wanted: NodeStatus) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while state.engine.status(node) != wanted {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("status reached in time");
    }

    #[tokio::test]
    async fn execute_runs_in_background_and_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let executors = ExecutorRegistry::new().with(
            "fail",
            Arc::new(FnExecutor(|_: Invocation| async { Err(anyhow::anyhow!("boom")) })),
        );
        let state = state_with(&dir, Arc::new(Unreachable), executors);
        let graph = state.engine.graph();
        graph.add_node(Node::new("a", "http"));
        graph.add_node(Node::new("b", "fail"));
        graph.add_node(Node::new("c", "http"));
        graph.add_edge(Edge::new("e1", "a", "b"));

        let (code, _) = execute(State(state.clone()), String::new()).await.unwrap();
        assert_eq!(code, StatusCode::ACCEPTED);

        wait_for(&state, "b", NodeStatus::Error).await;
        wait_for(&state, "c", NodeStatus::Success).await;
        assert_eq!(state.engine.status("a"), NodeStatus::Success);

        let Json(snapshot) = status(State(state)).await;
        assert!(snapshot.executing.is_empty());
        assert_eq!(snapshot.nodes["b"].status, NodeStatus::Error);
        assert_eq!(snapshot.relay, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn explicit_start_ids_limit_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state.engine.graph().add_node(Node::new("a", "http"));
        state.engine.graph().add_node(Node::new("b", "http"));

        let body = json!({"startIds": ["b"]}).to_string();
        execute(State(state.clone()), body).await.unwrap();

        wait_for(&state, "b", NodeStatus::Success).await;
        assert_eq!(state.engine.status("a"), NodeStatus::Idle);
    }

    #[tokio::test]
    async fn malformed_request_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);

        let err = execute(State(state), "{\"startIds\": 7}".to_string()).await.unwrap_err();
        assert_eq!(err, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stop_cancels_schedules_and_resets_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state.engine.graph().add_node(
            Node::new("tick", "schedule")
                .with_data("active", json!(true))
                .with_data("intervalValue", json!(1))
                .with_data("intervalUnit", json!("hours")),
        );

        execute(State(state.clone()), String::new()).await.unwrap();
        wait_for(&state, "tick", NodeStatus::Success).await;
        assert_eq!(state.engine.scheduled_node_ids(), vec!["tick"]);

        let Json(snapshot) = stop(State(state)).await;
        assert!(!snapshot.running);
        assert!(snapshot.scheduled.is_empty());
        assert_eq!(snapshot.nodes["tick"].status, NodeStatus::Idle);
    }
}
