use std::time::Duration;
use thiserror::Error;

/// Failures surfaced to callers of the relay channel
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("webhook registration needs a non-empty '{0}'")]
    InvalidRegistration(&'static str),

    #[error("relay did not accept the connection within {0:?}")]
    ConnectTimeout(Duration),

    #[error("relay connection failed: {0}")]
    ConnectFailed(String),

    #[error("relay connection closed")]
    Closed,

    #[error("relay reported an error for '{node_id}': {message}")]
    Webhook { node_id: String, message: String },

    #[error("failed to encode relay message: {0}")]
    Encode(#[from] serde_json::Error),
}
