/// Webhook relay endpoints
///
/// Registrations and executions are built from the webhook node's data in the
/// graph; a registration request body may override any of those fields.

use crate::{
    api::AppState,
    relay::{RelayError, WebhookRegistration},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Map, Value};

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks", post(register_webhook))
        .route("/api/webhooks/{id}/execute", post(execute_webhook))
}

/// Register a webhook endpoint with the relay
///
/// POST /api/webhooks
/// Body: { "nodeId": "...", "path": "...", "method": "...", "headers": {...}, "body": ..., "queryParams": {...} }
pub async fn register_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<WebhookRegistration>), StatusCode> {
    let Some(node_id) = payload.get("nodeId").and_then(Value::as_str) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let mut data = state
        .engine
        .graph()
        .node(node_id)
        .map(|node| node.data)
        .unwrap_or_default();
    for (key, value) in payload.iter().filter(|(key, _)| key.as_str() != "nodeId") {
        data.insert(key.clone(), value.clone());
    }

    let registration = WebhookRegistration::from_node_data(node_id, &data);
    // validation shows up later through the relay's registrations
    state
        .relay
        .register(registration.clone())
        .await
        .map_err(|e| relay_status(&e))?;

    Ok((StatusCode::ACCEPTED, Json(registration.with_defaults())))
}

/// Execute a webhook node through the relay and return its result
///
/// POST /api/webhooks/{id}/execute
pub async fn execute_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let Some(node) = state.engine.graph().node(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };

    let registration = WebhookRegistration::from_node_data(&node.id, &node.data);
    let data = state
        .relay
        .execute(registration)
        .await
        .map_err(|e| relay_status(&e))?;

    Ok(Json(json!({ "nodeId": id, "data": data })))
}

fn relay_status(error: &RelayError) -> StatusCode {
    match error {
        RelayError::InvalidRegistration(_) => {
            tracing::warn!("❌ Invalid webhook registration: {}", error);
            StatusCode::BAD_REQUEST
        }
        RelayError::Encode(_) => {
            tracing::error!("Failed to encode relay message: {}", error);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => {
            tracing::error!("❌ Relay request failed: {}", error);
            StatusCode::BAD_GATEWAY
        }
    }
}
