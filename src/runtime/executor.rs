/// Node-kind executors
///
/// The engine owns a registry of kind → executor and calls the executor
/// directly while walking the graph, awaiting its result before deciding
/// `success` or `error`. Concrete business logic (HTTP, databases, email)
/// lives outside this crate and plugs in through [`NodeExecutor`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt, future::Future, sync::Arc};

/// Everything an executor gets to see about the node it runs
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Graph node id being executed
    pub node_id: String,
    /// Node kind the executor was selected by
    pub kind: String,
    /// The node's configuration data
    pub data: Map<String, Value>,
    /// Output of the upstream node (or the trigger payload)
    pub input: Value,
}

/// Business logic for one node kind
///
/// Returning an error marks the node `error` and stops fan-out on that path.
/// The returned value becomes the input of every downstream neighbour.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, invocation: Invocation) -> Result<Value>;
}

/// Adapter turning an async closure into a [`NodeExecutor`]
pub struct FnExecutor<F>(pub F);

#[async_trait]
impl<F, Fut> NodeExecutor for FnExecutor<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn execute(&self, invocation: Invocation) -> Result<Value> {
        (self.0)(invocation).await
    }
}

/// Kind → executor lookup table
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for a node kind
    pub fn register(&mut self, kind: impl Into<String>, executor: Arc<dyn NodeExecutor>) -> &mut Self {
        let kind = kind.into();
        tracing::debug!("🧩 Registered executor for node kind '{}'", kind);
        self.executors.insert(kind, executor);
        self
    }

    /// Builder-style registration
    pub fn with(mut self, kind: impl Into<String>, executor: Arc<dyn NodeExecutor>) -> Self {
        self.register(kind, executor);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.executors.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
