/// Persistent duplex channel to the webhook relay
///
/// Owns the single connection to the relay process, serializes outbound
/// messages, dispatches inbound ones, and correlates execution results back
/// to the callers waiting on them.
///
/// Reconnect policy: after an unexpected close the channel retries up to
/// `max_retries` times, `retry_delay` apart. Once retries are exhausted it
/// stays disconnected until the next `send`/`register`/`execute`, which
/// resets the counter and makes a fresh attempt.

use crate::config::RelayConfig;
use crate::relay::codec::{Frame, RelayLineCodec};
use crate::relay::error::RelayError;
use crate::relay::protocol::{
    InboundMessage, OutboundMessage, RelayNodeId, RequestId, WebhookRegistration,
};
use crate::relay::transport::{BoxedRelayStream, RelayConnector};
use crate::runtime::status::{NodeStatus, StatusTracker};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

/// Connection lifecycle as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Resolves once the relay confirms a registration
pub type ValidationReceiver = oneshot::Receiver<()>;

/// One live connection: outbound queue plus its reader/writer tasks
struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// An `execute` call waiting for its result
struct PendingExecution {
    request_id: RequestId,
    node_id: RelayNodeId,
    reply: oneshot::Sender<Result<Value, RelayError>>,
}

struct RelayInner {
    connector: Arc<dyn RelayConnector>,
    config: RelayConfig,
    statuses: Arc<StatusTracker>,
    state: Mutex<ConnectionState>,
    connection: Mutex<Option<Connection>>,
    /// Serializes connect attempts so concurrent senders share one
    connect_lock: tokio::sync::Mutex<()>,
    retries: AtomicU32,
    generation: AtomicU64,
    /// Set by a deliberate `close`; suppresses reconnects
    closing: AtomicBool,
    registrations: Mutex<HashMap<RelayNodeId, WebhookRegistration>>,
    pending_validations: Mutex<HashMap<RelayNodeId, oneshot::Sender<()>>>,
    /// In request order, so id-less results resolve the oldest call first
    pending_executions: Mutex<Vec<PendingExecution>>,
}

/// Cheaply cloneable handle to the relay channel
#[derive(Clone)]
pub struct RelayChannel {
    inner: Arc<RelayInner>,
}

/// Removes a pending execution if the waiting `execute` future is dropped
struct PendingGuard<'a> {
    inner: &'a RelayInner,
    request_id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner
            .pending_executions
            .lock()
            .retain(|pending| pending.request_id != self.request_id);
    }
}

impl RelayChannel {
    pub fn new(
        connector: Arc<dyn RelayConnector>,
        config: RelayConfig,
        statuses: Arc<StatusTracker>,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                connector,
                config,
                statuses,
                state: Mutex::new(ConnectionState::Disconnected),
                connection: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                retries: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                closing: AtomicBool::new(false),
                registrations: Mutex::new(HashMap::new()),
                pending_validations: Mutex::new(HashMap::new()),
                pending_executions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Registrations accepted since the current connection opened
    pub fn registrations(&self) -> Vec<WebhookRegistration> {
        self.inner.registrations.lock().values().cloned().collect()
    }

    pub fn pending_execution_count(&self) -> usize {
        self.inner.pending_executions.lock().len()
    }

    /// Serialize and transmit a message, connecting first if needed
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), RelayError> {
        let line = serde_json::to_string(message)?;
        let outbound = self.ensure_connected().await?;
        outbound.send(line).map_err(|_| RelayError::Closed)
    }

    /// Register a webhook endpoint with the relay
    ///
    /// Returns a receiver that resolves when the relay answers with
    /// `webhook_validated` for the same node id.
    pub async fn register(
        &self,
        registration: WebhookRegistration,
    ) -> Result<ValidationReceiver, RelayError> {
        registration.validate()?;
        let registration = registration.with_defaults();
        let node_id = registration.node_id.clone();

        let (validated_tx, validated_rx) = oneshot::channel();
        // stored before sending so a fast reply can't be missed
        self.inner
            .pending_validations
            .lock()
            .insert(node_id.clone(), validated_tx);

        let message = OutboundMessage::Register {
            webhook: registration.clone(),
        };
        if let Err(e) = self.send(&message).await {
            self.inner.pending_validations.lock().remove(&node_id);
            return Err(e);
        }

        tracing::info!("📝 Registered webhook '{}' at {} {}",
            node_id, registration.method, registration.path);
        self.inner.registrations.lock().insert(node_id, registration);
        Ok(validated_rx)
    }

    /// Ask the relay to execute a webhook and wait for its result
    ///
    /// Resolves with the `data` of the `webhook_execution` message whose
    /// `nodeId` matches exactly (and whose `requestId` matches, when the relay
    /// echoes one). A `webhook_error` for the call rejects it.
    pub async fn execute(&self, registration: WebhookRegistration) -> Result<Value, RelayError> {
        registration.validate()?;
        let registration = registration.with_defaults();
        let request_id = RequestId::new();
        let node_id = registration.node_id.clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.pending_executions.lock().push(PendingExecution {
            request_id,
            node_id: node_id.clone(),
            reply: reply_tx,
        });
        let _guard = PendingGuard {
            inner: &self.inner,
            request_id,
        };

        tracing::debug!("📤 Executing webhook '{}' (request {})", node_id, request_id);
        self.send(&OutboundMessage::Execute {
            webhook: registration,
            request_id,
        })
        .await?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Closed),
        }
    }

    /// Best-effort local cleanup when a node goes away
    pub fn forget(&self, graph_node_id: &str) {
        let node_id = RelayNodeId::for_node(graph_node_id);
        self.inner.registrations.lock().remove(&node_id);
        self.inner.pending_validations.lock().remove(&node_id);
    }

    /// Deliberately close the connection; no reconnect follows
    pub fn close(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        let connection = self.inner.connection.lock().take();
        drop(connection);
        *self.inner.state.lock() = ConnectionState::Disconnected;
        self.inner.registrations.lock().clear();
        tracing::info!("🔌 Relay connection closed");
    }

    fn open_sender(&self) -> Option<mpsc::UnboundedSender<String>> {
        self.inner
            .connection
            .lock()
            .as_ref()
            .filter(|connection| !connection.outbound.is_closed())
            .map(|connection| connection.outbound.clone())
    }

    /// Caller-driven connect: resets the retry budget, then one bounded attempt
    async fn ensure_connected(&self) -> Result<mpsc::UnboundedSender<String>, RelayError> {
        if let Some(outbound) = self.open_sender() {
            return Ok(outbound);
        }
        self.inner.retries.store(0, Ordering::SeqCst);
        self.inner.closing.store(false, Ordering::SeqCst);
        self.connect_once().await?;
        self.open_sender().ok_or(RelayError::Closed)
    }

    /// One connect attempt bounded by the connect timeout
    async fn connect_once(&self) -> Result<(), RelayError> {
        let _connecting = self.inner.connect_lock.lock().await;
        if self.open_sender().is_some() {
            return Ok(());
        }

        *self.inner.state.lock() = ConnectionState::Connecting;
        let timeout = self.inner.config.connect_timeout();
        tracing::debug!("🔌 Connecting to {}", self.inner.connector.describe());

        let stream = match tokio::time::timeout(timeout, self.inner.connector.connect()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                *self.inner.state.lock() = ConnectionState::Disconnected;
                return Err(RelayError::ConnectFailed(e.to_string()));
            }
            Err(_) => {
                *self.inner.state.lock() = ConnectionState::Disconnected;
                return Err(RelayError::ConnectTimeout(timeout));
            }
        };

        self.install(stream);
        self.inner.retries.store(0, Ordering::SeqCst);
        *self.inner.state.lock() = ConnectionState::Open;
        tracing::info!("✅ Connected to {}", self.inner.connector.describe());
        Ok(())
    }

    /// Spawn reader and writer tasks for a freshly opened stream
    fn install(&self, stream: BoxedRelayStream) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let framed = Framed::new(stream, RelayLineCodec::new());
        let (mut sink, mut lines) = framed.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(line) = queue.recv().await {
                if let Err(e) = sink.send(line).await {
                    tracing::warn!("⚠️ Relay write failed: {}", e);
                    break;
                }
            }
        });

        let channel = Arc::downgrade(&self.inner);
        let reader = tokio::spawn(async move {
            while let Some(frame) = lines.next().await {
                let Some(inner) = channel.upgrade() else {
                    return;
                };
                match frame {
                    Ok(Frame::Line(line)) => RelayChannel { inner }.dispatch(&line),
                    Ok(Frame::Skipped(reason)) => {
                        tracing::warn!("⚠️ Skipping unreadable relay line: {}", reason);
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Relay read failed: {}", e);
                        break;
                    }
                }
            }
            if let Some(inner) = Weak::upgrade(&channel) {
                RelayChannel { inner }.handle_close(generation);
            }
        });

        let previous = self.inner.connection.lock().replace(Connection {
            generation,
            outbound,
            reader,
            writer,
        });
        drop(previous);
    }

    /// Reader observed the stream end
    fn handle_close(&self, generation: u64) {
        let connection = {
            let mut slot = self.inner.connection.lock();
            if slot.as_ref().map(|current| current.generation) != Some(generation) {
                return;
            }
            slot.take()
        };

        *self.inner.state.lock() = ConnectionState::Disconnected;
        self.inner.registrations.lock().clear();

        if self.inner.closing.load(Ordering::SeqCst) {
            drop(connection);
            return;
        }

        tracing::warn!("⚠️ Relay connection closed unexpectedly, scheduling reconnect");
        let channel = self.clone();
        tokio::spawn(async move { channel.reconnect().await });
        // last: dropping aborts this very reader task
        drop(connection);
    }

    /// Bounded retry loop after an unexpected close
    async fn reconnect(&self) {
        let max_retries = self.inner.config.max_retries;
        loop {
            if self.inner.closing.load(Ordering::SeqCst) || self.open_sender().is_some() {
                return;
            }
            let attempt = self.inner.retries.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > max_retries {
                tracing::error!("❌ Giving up on relay after {} reconnect attempts", max_retries);
                return;
            }

            tokio::time::sleep(self.inner.config.retry_delay()).await;
            if self.inner.closing.load(Ordering::SeqCst) || self.open_sender().is_some() {
                return;
            }

            match self.connect_once().await {
                Ok(()) => {
                    tracing::info!("🔁 Relay reconnected on attempt {}/{}", attempt, max_retries);
                    return;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Relay reconnect attempt {}/{} failed: {}",
                        attempt, max_retries, e);
                }
            }
        }
    }

    /// Single dispatch point for inbound messages
    fn dispatch(&self, line: &str) {
        let message: InboundMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unrecognised relay message: {} ({})", line, e);
                return;
            }
        };

        match message {
            InboundMessage::WebhookValidated { node_id } => {
                let pending = self.inner.pending_validations.lock().remove(&node_id);
                if let Some(registration) = self.inner.registrations.lock().get_mut(&node_id) {
                    registration.validated = true;
                }
                match pending {
                    Some(validated) => {
                        tracing::info!("✅ Webhook '{}' validated by relay", node_id);
                        let _ = validated.send(());
                    }
                    None => tracing::debug!("⏭️ Validation for '{}' had no pending registration", node_id),
                }
            }
            InboundMessage::WebhookExecution { node_id, data, request_id } => {
                self.mark_executed(&node_id);
                match self.take_pending(&node_id, request_id) {
                    Some(pending) => {
                        let _ = pending.reply.send(Ok(data));
                    }
                    None => tracing::debug!("⏭️ Execution result for '{}' matched no pending call", node_id),
                }
            }
            InboundMessage::WebhookError { node_id, error, request_id } => {
                let message = match error {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                match self.take_pending(&node_id, request_id) {
                    Some(pending) => {
                        tracing::warn!("⚠️ Relay rejected '{}': {}", node_id, message);
                        let _ = pending.reply.send(Err(RelayError::Webhook {
                            node_id: node_id.to_string(),
                            message,
                        }));
                    }
                    None => tracing::warn!("⚠️ Dropping relay error for '{}': {}", node_id, message),
                }
            }
        }
    }

    /// Flip the underlying graph node to running, then success after the settle delay
    fn mark_executed(&self, node_id: &RelayNodeId) {
        let graph_node_id = node_id.graph_node_id().to_string();
        self.inner.statuses.update(&graph_node_id, NodeStatus::Running);

        let statuses = Arc::clone(&self.inner.statuses);
        let settle = self.inner.config.status_settle();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            statuses.update(&graph_node_id, NodeStatus::Success);
        });
    }

    /// Remove and return the pending call an inbound result belongs to
    fn take_pending(
        &self,
        node_id: &RelayNodeId,
        request_id: Option<RequestId>,
    ) -> Option<PendingExecution> {
        let mut pending = self.inner.pending_executions.lock();
        let position = pending.iter().position(|call| {
            &call.node_id == node_id && request_id.map_or(true, |id| id == call.request_id)
        })?;
        Some(pending.remove(position))
    }
}
