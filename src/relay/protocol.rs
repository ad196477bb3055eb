/// Relay wire protocol
///
/// One JSON object per line in each direction. The relay keys everything by a
/// namespaced node id (`webhook-<graph node id>`) so its registry can never
/// collide with graph node ids; [`RelayNodeId`] owns that convention.

use crate::relay::error::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt};
use uuid::Uuid;

/// Namespace prefix the relay uses for node ids
pub const RELAY_NODE_PREFIX: &str = "webhook-";

pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_BODY: &str = "{}";

/// Node id as known to the relay (always namespaced)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayNodeId(String);

impl RelayNodeId {
    /// Namespace a graph node id
    pub fn for_node(graph_node_id: &str) -> Self {
        Self(format!("{}{}", RELAY_NODE_PREFIX, graph_node_id))
    }

    /// Graph node id with the namespace stripped
    pub fn graph_node_id(&self) -> &str {
        self.0.strip_prefix(RELAY_NODE_PREFIX).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.graph_node_id().is_empty()
    }
}

impl fmt::Display for RelayNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation key generated for every `execute` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Webhook endpoint description sent to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub node_id: RelayNodeId,
    pub path: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    #[serde(default, rename = "isValidated")]
    pub validated: bool,
}

impl WebhookRegistration {
    pub fn new(node_id: RelayNodeId, path: impl Into<String>) -> Self {
        Self {
            node_id,
            path: path.into(),
            method: String::new(),
            headers: BTreeMap::new(),
            body: String::new(),
            query_params: BTreeMap::new(),
            validated: false,
        }
    }

    /// Build a registration from a webhook node's configuration data
    ///
    /// Reads `path`, `method`, `headers`, `body` and `queryParams`. A non-string
    /// `body` is sent as its JSON encoding.
    pub fn from_node_data(graph_node_id: &str, data: &Map<String, Value>) -> Self {
        let text = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        let body = match data.get("body") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(body)) => body.clone(),
            Some(other) => other.to_string(),
        };

        Self {
            node_id: RelayNodeId::for_node(graph_node_id),
            path: text("path"),
            method: text("method"),
            headers: string_map(data.get("headers")),
            body,
            query_params: string_map(data.get("queryParams")),
            validated: false,
        }
    }

    /// `nodeId` and `path` are required
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.node_id.is_empty() {
            return Err(RelayError::InvalidRegistration("nodeId"));
        }
        if self.path.trim().is_empty() {
            return Err(RelayError::InvalidRegistration("path"));
        }
        Ok(())
    }

    /// Fill empty fields with the protocol defaults
    pub fn with_defaults(mut self) -> Self {
        if self.method.is_empty() {
            self.method = DEFAULT_METHOD.to_string();
        }
        if self.body.is_empty() {
            self.body = DEFAULT_BODY.to_string();
        }
        if self.headers.is_empty() {
            self.headers
                .insert("Content-Type".to_string(), "application/json".to_string());
        }
        self.validated = false;
        self
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| {
                    let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                    (key.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Messages sent to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    Register {
        webhook: WebhookRegistration,
    },
    Execute {
        webhook: WebhookRegistration,
        request_id: RequestId,
    },
}

/// Messages received from the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    WebhookValidated {
        node_id: RelayNodeId,
    },
    WebhookExecution {
        node_id: RelayNodeId,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        request_id: Option<RequestId>,
    },
    WebhookError {
        node_id: RelayNodeId,
        #[serde(default)]
        error: Value,
        #[serde(default)]
        request_id: Option<RequestId>,
    },
}
