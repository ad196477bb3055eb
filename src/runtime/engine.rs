/// Graph execution engine
///
/// Walks the graph from trigger nodes, drives the status tracker and the
/// schedule registry, and enforces at most one concurrent execution per node.
///
/// Execution is depth-first and strictly sequential: top-level triggers run
/// in the order given, downstream neighbours run in edge order, and each step
/// is awaited to completion before the next one starts.

use crate::config::EngineConfig;
use crate::runtime::executor::{ExecutorRegistry, Invocation};
use crate::runtime::scheduler::{ScheduleHandle, ScheduleSpec, SchedulerRegistry};
use crate::runtime::status::{NodeStatus, StatusEntry, StatusEvent, StatusTracker};
use crate::workflow::graph::GraphStore;
use crate::workflow::types::{is_truthy, Node};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Why a single node step did not complete
#[derive(Debug)]
enum StepError {
    /// A global stop happened while the step was in flight
    Interrupted,
    /// The node body failed
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for StepError {
    fn from(error: anyhow::Error) -> Self {
        StepError::Failed(error)
    }
}

/// Shared engine state; every field is owned by one engine instance
struct EngineInner {
    graph: Arc<GraphStore>,
    statuses: Arc<StatusTracker>,
    schedules: SchedulerRegistry,
    executors: ExecutorRegistry,
    /// Node id → entry ticket of the call currently executing it
    executing: Mutex<HashMap<String, u64>>,
    next_ticket: AtomicU64,
    running: AtomicBool,
    /// Cancelled and replaced by every global stop
    run_token: Mutex<CancellationToken>,
    config: EngineConfig,
}

/// Cheaply cloneable handle to one execution engine
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

/// Membership in the executing set for the duration of one `execute_node` call
struct ExecutingGuard<'a> {
    inner: &'a EngineInner,
    node_id: String,
    ticket: u64,
}

impl<'a> ExecutingGuard<'a> {
    /// Enter the executing set, or `None` if the node is already in it
    fn enter(inner: &'a EngineInner, node_id: &str) -> Option<Self> {
        let mut executing = inner.executing.lock();
        if executing.contains_key(node_id) {
            return None;
        }
        let ticket = inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        executing.insert(node_id.to_string(), ticket);
        Some(Self {
            inner,
            node_id: node_id.to_string(),
            ticket,
        })
    }
}

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        let mut executing = self.inner.executing.lock();
        // a stop may have cleared the set and a newer call re-entered since
        if executing.get(&self.node_id) == Some(&self.ticket) {
            executing.remove(&self.node_id);
        }
    }
}

impl ExecutionEngine {
    /// Create an engine over a graph store and status tracker
    pub fn new(
        graph: Arc<GraphStore>,
        statuses: Arc<StatusTracker>,
        executors: ExecutorRegistry,
        config: EngineConfig,
    ) -> Self {
        tracing::debug!("⚙️ Execution engine created with executors: {:?}", executors.kinds());
        Self {
            inner: Arc::new(EngineInner {
                graph,
                statuses,
                schedules: SchedulerRegistry::new(),
                executors,
                executing: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(0),
                running: AtomicBool::new(false),
                run_token: Mutex::new(CancellationToken::new()),
                config,
            }),
        }
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.inner.graph
    }

    pub fn statuses(&self) -> &Arc<StatusTracker> {
        &self.inner.statuses
    }

    /// Whether a workflow is considered executing (stays true while schedules are armed)
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_executing(&self, node_id: &str) -> bool {
        self.inner.executing.lock().contains_key(node_id)
    }

    pub fn executing_node_ids(&self) -> Vec<String> {
        self.inner.executing.lock().keys().cloned().collect()
    }

    pub fn scheduled_node_ids(&self) -> Vec<String> {
        self.inner.schedules.node_ids()
    }

    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.inner.statuses.status_of(node_id)
    }

    pub fn status_snapshot(&self) -> HashMap<String, StatusEntry> {
        self.inner.statuses.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.statuses.subscribe()
    }

    /// Direct, unconditional status write
    pub fn update_node_status(&self, node_id: &str, status: NodeStatus) {
        self.inner.statuses.update(node_id, status);
    }

    fn current_token(&self) -> CancellationToken {
        self.inner.run_token.lock().clone()
    }

    /// Reset, then run each start node in order
    ///
    /// Always stops whatever ran before. An empty `start_ids` runs every
    /// trigger node (nodes without incoming edges). A stop issued while the
    /// loop is in progress prevents any further start node from beginning.
    pub async fn execute_workflow(&self, start_ids: &[String]) {
        self.stop_execution();

        let start_ids = if start_ids.is_empty() {
            self.inner.graph.trigger_node_ids()
        } else {
            start_ids.to_vec()
        };

        let token = self.current_token();
        self.inner.running.store(true, Ordering::SeqCst);
        tracing::info!("🚀 Starting workflow execution from {} trigger(s): {:?}",
            start_ids.len(), start_ids);
        let started = std::time::Instant::now();

        for (step, node_id) in start_ids.iter().enumerate() {
            if token.is_cancelled() {
                tracing::warn!("⏸️ Workflow stopped before trigger {}/{} ('{}')",
                    step + 1, start_ids.len(), node_id);
                break;
            }
            tracing::info!("📍 Trigger {}/{}: '{}'", step + 1, start_ids.len(), node_id);
            self.execute_node(node_id, false).await;
        }

        tracing::info!("🎉 Workflow pass finished in {:?} ({} schedule(s) armed)",
            started.elapsed(), self.inner.schedules.len());
    }

    /// Execute one node and everything downstream of it
    ///
    /// Returns `false` without touching any state if the node is already
    /// executing.
    pub async fn execute_node(&self, node_id: &str, is_scheduled: bool) -> bool {
        let Some(guard) = ExecutingGuard::enter(&self.inner, node_id) else {
            tracing::debug!("⏭️ Node '{}' is already executing, skipping", node_id);
            return false;
        };

        self.inner.running.store(true, Ordering::SeqCst);
        let token = self.current_token();
        self.execute_with_delay(node_id.to_string(), is_scheduled, Value::Null, token)
            .await;
        drop(guard);

        if self.inner.schedules.is_empty() {
            self.inner.running.store(false, Ordering::SeqCst);
        }
        true
    }

    /// Recursive step: run `target`, then fan out on success
    fn execute_with_delay(
        &self,
        target: String,
        scheduled: bool,
        input: Value,
        token: CancellationToken,
    ) -> BoxFuture<'_, ()> {
        async move {
            let Some(node) = self.inner.graph.node(&target) else {
                tracing::debug!("⏭️ Unknown node '{}', nothing to execute", target);
                return;
            };
            if token.is_cancelled() {
                return;
            }

            self.inner.statuses.update(&target, NodeStatus::Running);

            let delay = self.inner.config.step_delay();
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let result = if node.is_schedule() {
                self.run_schedule(&node, scheduled, &token).await
            } else {
                self.run_action(&node, scheduled, input, &token).await
            };

            match result {
                Ok(()) => {}
                Err(StepError::Interrupted) => {
                    tracing::debug!("🛑 Node '{}' interrupted by stop", target);
                }
                Err(StepError::Failed(e)) => {
                    tracing::error!("❌ Node '{}' ({}) failed: {}", target, node.kind, e);
                    if !token.is_cancelled() {
                        self.inner.statuses.update(&target, NodeStatus::Error);
                    }
                }
            }
        }
        .boxed()
    }

    /// Run a non-schedule node through its executor, then fan out
    async fn run_action(
        &self,
        node: &Node,
        scheduled: bool,
        input: Value,
        token: &CancellationToken,
    ) -> Result<(), StepError> {
        let output = match self.inner.executors.get(&node.kind) {
            Some(executor) => {
                let invocation = Invocation {
                    node_id: node.id.clone(),
                    kind: node.kind.clone(),
                    data: node.data.clone(),
                    input,
                };
                let started = std::time::Instant::now();
                let output = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(StepError::Interrupted),
                    result = executor.execute(invocation) => result?,
                };
                tracing::info!("✅ Node '{}' completed in {:?}", node.id, started.elapsed());
                output
            }
            None => {
                tracing::debug!("➡️ No executor for kind '{}', passing input through", node.kind);
                input
            }
        };

        if token.is_cancelled() {
            return Err(StepError::Interrupted);
        }
        self.inner.statuses.update(&node.id, NodeStatus::Success);
        self.fan_out(&node.id, scheduled, output, token).await;
        Ok(())
    }

    /// Arm (or re-arm) a schedule node
    async fn run_schedule(
        &self,
        node: &Node,
        scheduled: bool,
        token: &CancellationToken,
    ) -> Result<(), StepError> {
        self.inner.schedules.cancel(&node.id);

        if !is_truthy(node.data.get("active")) {
            tracing::warn!("⚠️ Schedule '{}' is disabled, not arming", node.id);
            self.inner.statuses.update(&node.id, NodeStatus::Warning);
            return Ok(());
        }

        let spec = ScheduleSpec::from_data(&node.data)?;

        if !scheduled && spec.execute_initially {
            tracing::info!("⚡ Schedule '{}' runs its downstream nodes immediately", node.id);
            self.fan_out(&node.id, true, schedule_payload(&node.id), token).await;
            if token.is_cancelled() {
                return Err(StepError::Interrupted);
            }
        }

        self.arm_schedule(&node.id, spec.interval, token.clone());
        self.inner.statuses.update(&node.id, NodeStatus::Success);
        tracing::info!("⏰ Schedule '{}' armed every {:?}", node.id, spec.interval);
        Ok(())
    }

    /// Spawn the recurring timer task and register it
    ///
    /// The task holds only a weak reference to the engine so a dropped
    /// engine never stays alive through its own timers. Every tick runs under
    /// the token of the run that armed it.
    fn arm_schedule(&self, node_id: &str, period: Duration, token: CancellationToken) {
        let timer_id = self.inner.schedules.next_timer_id();
        let engine = Arc::downgrade(&self.inner);
        let owned_id = node_id.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = upgrade(&engine) else {
                    break;
                };
                if !engine.on_schedule_tick(&owned_id, timer_id, &token).await {
                    break;
                }
            }
        });

        self.inner.schedules.arm(node_id, ScheduleHandle::new(timer_id, task));
    }

    /// One timer tick; returns `false` once the timer should stop
    async fn on_schedule_tick(&self, node_id: &str, timer_id: u64, token: &CancellationToken) -> bool {
        if token.is_cancelled() || !self.is_running() {
            tracing::info!("🛑 Schedule '{}' found execution stopped, cancelling itself", node_id);
            self.inner.schedules.release(node_id, timer_id);
            return false;
        }

        tracing::debug!("🔔 Schedule '{}' fired", node_id);
        self.inner.statuses.update(node_id, NodeStatus::Running);
        self.fan_out(node_id, true, schedule_payload(node_id), token).await;
        if token.is_cancelled() {
            return false;
        }
        self.inner.statuses.update(node_id, NodeStatus::Success);
        true
    }

    /// Run every downstream neighbour of `source`, in edge order, one at a time
    async fn fan_out(&self, source: &str, scheduled: bool, input: Value, token: &CancellationToken) {
        for next in self.inner.graph.outgoing_targets(source) {
            if token.is_cancelled() {
                break;
            }
            self.execute_with_delay(next, scheduled, input.clone(), token.clone())
                .await;
        }
    }

    /// Cancel every schedule, reset every status to idle, clear the executing set
    ///
    /// Synchronous. In-flight executor calls are cancelled through the run
    /// token and are dropped at their next suspension point without writing
    /// any further status.
    pub fn stop_execution(&self) {
        let cancelled = self.inner.schedules.cancel_all();
        {
            let mut token = self.inner.run_token.lock();
            token.cancel();
            *token = CancellationToken::new();
        }
        self.inner.statuses.reset_all();
        self.inner.executing.lock().clear();
        self.inner.running.store(false, Ordering::SeqCst);

        tracing::info!("⏹️ Execution stopped ({} schedule(s) cancelled)", cancelled);
    }

    /// Delete a node: cancel its schedule first, then remove it and its edges
    pub fn delete_node(&self, node_id: &str) -> Option<Node> {
        if self.inner.schedules.cancel(node_id) {
            tracing::info!("🛑 Cancelled schedule of deleted node '{}'", node_id);
            if self.inner.schedules.is_empty() && self.inner.executing.lock().is_empty() {
                self.inner.running.store(false, Ordering::SeqCst);
            }
        }
        let removed = self.inner.graph.remove_node(node_id);
        self.inner.statuses.remove(node_id);
        removed
    }
}

fn upgrade(inner: &Weak<EngineInner>) -> Option<ExecutionEngine> {
    inner.upgrade().map(|inner| ExecutionEngine { inner })
}

/// Input handed to the downstream neighbours of a firing schedule
fn schedule_payload(node_id: &str) -> Value {
    json!({
        "triggerType": "schedule",
        "nodeId": node_id,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::executor::{FnExecutor, NodeExecutor};
    use crate::workflow::types::{Edge, SCHEDULE_KIND};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn counter_executor(counter: Arc<AtomicUsize>) -> Arc<dyn NodeExecutor> {
        Arc::new(FnExecutor(move |_invocation: Invocation| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        }))
    }

    fn engine_with(graph: GraphStore, executors: ExecutorRegistry) -> ExecutionEngine {
        ExecutionEngine::new(
            Arc::new(graph),
            Arc::new(StatusTracker::new()),
            executors,
            EngineConfig { step_delay_ms: 0 },
        )
    }

    fn schedule_node(id: &str, active: bool, initial: &str) -> Node {
        Node::new(id, SCHEDULE_KIND)
            .with_data("active", json!(active))
            .with_data("intervalValue", json!(1))
            .with_data("intervalUnit", json!("seconds"))
            .with_data("initialBehavior", json!(initial))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn runs_chain_and_passes_outputs_downstream() {
        let graph = GraphStore::new();
        graph.add_node(Node::new("a", "double"));
        graph.add_node(Node::new("b", "double"));
        graph.add_node(Node::new("c", "sink"));
        graph.add_edge(Edge::new("e1", "a", "b"));
        graph.add_edge(Edge::new("e2", "b", "c"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let executors = ExecutorRegistry::new()
            .with(
                "double",
                Arc::new(FnExecutor(|invocation: Invocation| async move {
                    Ok(json!(invocation.input.as_i64().unwrap_or(1) * 2))
                })),
            )
            .with(
                "sink",
                Arc::new(FnExecutor(move |invocation: Invocation| {
                    let seen = Arc::clone(&sink_seen);
                    async move {
                        seen.lock().push(invocation.input);
                        Ok(Value::Null)
                    }
                })),
            );
        let engine = engine_with(graph, executors);

        engine.execute_workflow(&[]).await;

        assert_eq!(*seen.lock(), vec![json!(4)]);
        for id in ["a", "b", "c"] {
            assert_eq!(engine.status(id), NodeStatus::Success);
        }
        assert!(!engine.is_running());
        assert!(engine.executing_node_ids().is_empty());
    }

    #[tokio::test]
    async fn nodes_without_executor_succeed_directly() {
        let graph = GraphStore::new();
        graph.add_node(Node::new("ui-only", "note"));
        let engine = engine_with(graph, ExecutorRegistry::new());

        assert!(engine.execute_node("ui-only", false).await);
        assert_eq!(engine.status("ui-only"), NodeStatus::Success);
    }

    #[tokio::test]
    async fn reentrant_execute_node_is_a_noop() {
        let graph = GraphStore::new();
        graph.add_node(Node::new("slow", "gate"));

        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (gate_in, calls_in) = (Arc::clone(&gate), Arc::clone(&calls));
        let executors = ExecutorRegistry::new().with(
            "gate",
            Arc::new(FnExecutor(move |_invocation: Invocation| {
                let gate = Arc::clone(&gate_in);
                calls_in.fetch_add(1, Ordering::SeqCst);
                async move {
                    gate.notified().await;
                    Ok(Value::Null)
                }
            })),
        );
        let engine = engine_with(graph, executors);

        let background = engine.clone();
        let first = tokio::spawn(async move { background.execute_node("slow", false).await });
        settle().await;
        assert!(engine.is_executing("slow"));
        let before = engine.statuses().get("slow");

        assert!(!engine.execute_node("slow", false).await);
        assert_eq!(engine.statuses().get("slow"), before);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert!(first.await.unwrap());
        assert_eq!(engine.status("slow"), NodeStatus::Success);
        assert!(!engine.is_executing("slow"));
    }

    #[tokio::test]
    async fn failing_trigger_does_not_block_the_next_one() {
        let graph = GraphStore::new();
        graph.add_node(Node::new("a", "fail"));
        graph.add_node(Node::new("a-child", "record"));
        graph.add_node(Node::new("b", "record"));
        graph.add_edge(Edge::new("e1", "a", "a-child"));

        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let (fail_log, record_log) = (Arc::clone(&log), Arc::clone(&log));
        let executors = ExecutorRegistry::new()
            .with(
                "fail",
                Arc::new(FnExecutor(move |invocation: Invocation| {
                    let log = Arc::clone(&fail_log);
                    async move {
                        log.lock().push(format!("start {}", invocation.node_id));
                        tokio::task::yield_now().await;
                        log.lock().push(format!("end {}", invocation.node_id));
                        Err(anyhow::anyhow!("boom"))
                    }
                })),
            )
            .with(
                "record",
                Arc::new(FnExecutor(move |invocation: Invocation| {
                    let log = Arc::clone(&record_log);
                    async move {
                        log.lock().push(format!("start {}", invocation.node_id));
                        Ok(Value::Null)
                    }
                })),
            );
        let engine = engine_with(graph, executors);

        engine.execute_workflow(&["a".to_string(), "b".to_string()]).await;

        assert_eq!(engine.status("a"), NodeStatus::Error);
        assert_eq!(engine.status("b"), NodeStatus::Success);
        assert_eq!(engine.status("a-child"), NodeStatus::Idle);
        assert_eq!(*log.lock(), vec!["start a", "end a", "start b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_schedule_warns_and_leaves_downstream_idle() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", false, "execute"));
        graph.add_node(Node::new("d", "count"));
        graph.add_edge(Edge::new("e1", "s", "d"));

        let count = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            graph,
            ExecutorRegistry::new().with("count", counter_executor(Arc::clone(&count))),
        );

        engine.execute_workflow(&["s".to_string()]).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(engine.status("s"), NodeStatus::Warning);
        assert!(engine.statuses().get("d").is_none());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(engine.scheduled_node_ids().is_empty());
        assert!(!engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn active_schedule_fires_every_second_until_stopped() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "wait"));
        graph.add_node(Node::new("d", "count"));
        graph.add_edge(Edge::new("e1", "s", "d"));

        let count = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            graph,
            ExecutorRegistry::new().with("count", counter_executor(Arc::clone(&count))),
        );

        engine.execute_workflow(&["s".to_string()]).await;
        assert_eq!(engine.status("s"), NodeStatus::Success);
        assert_eq!(engine.scheduled_node_ids(), vec!["s"]);
        assert!(engine.is_running());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(engine.status("d"), NodeStatus::Success);

        engine.stop_execution();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(engine.status("s"), NodeStatus::Idle);
        assert_eq!(engine.status("d"), NodeStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_behavior_execute_fans_out_immediately() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "execute"));
        graph.add_node(Node::new("d1", "count"));
        graph.add_node(Node::new("d2", "count"));
        graph.add_edge(Edge::new("e1", "s", "d1"));
        graph.add_edge(Edge::new("e2", "s", "d2"));

        let count = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            graph,
            ExecutorRegistry::new().with("count", counter_executor(Arc::clone(&count))),
        );

        engine.execute_workflow(&["s".to_string()]).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        engine.stop_execution();
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_schedule_interval_is_an_error() {
        let graph = GraphStore::new();
        graph.add_node(
            Node::new("s", SCHEDULE_KIND)
                .with_data("active", json!(true))
                .with_data("intervalValue", json!(1))
                .with_data("intervalUnit", json!("fortnights")),
        );
        let engine = engine_with(graph, ExecutorRegistry::new());

        engine.execute_node("s", false).await;

        assert_eq!(engine.status("s"), NodeStatus::Error);
        assert!(engine.scheduled_node_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_everything() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "execute"));
        graph.add_node(Node::new("d", "plain"));
        graph.add_node(Node::new("x", "plain"));
        graph.add_edge(Edge::new("e1", "s", "d"));
        let engine = engine_with(graph, ExecutorRegistry::new());

        engine.execute_workflow(&["s".to_string(), "x".to_string()]).await;
        assert!(engine.is_running());
        assert_eq!(engine.status("x"), NodeStatus::Success);

        engine.stop_execution();

        assert!(engine.executing_node_ids().is_empty());
        assert!(engine.scheduled_node_ids().is_empty());
        assert!(!engine.is_running());
        let snapshot = engine.status_snapshot();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.values().all(|entry| entry.status == NodeStatus::Idle));
    }

    #[tokio::test]
    async fn stop_interrupts_in_flight_executor_without_stale_status() {
        let graph = GraphStore::new();
        graph.add_node(Node::new("hang", "hang"));
        graph.add_node(Node::new("after", "plain"));
        graph.add_edge(Edge::new("e1", "hang", "after"));
        let executors = ExecutorRegistry::new().with(
            "hang",
            Arc::new(FnExecutor(|_invocation: Invocation| async move {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            })),
        );
        let engine = engine_with(graph, executors);

        let background = engine.clone();
        let run = tokio::spawn(async move {
            background.execute_workflow(&["hang".to_string()]).await
        });
        settle().await;
        assert_eq!(engine.status("hang"), NodeStatus::Running);

        engine.stop_execution();
        run.await.unwrap();

        assert_eq!(engine.status("hang"), NodeStatus::Idle);
        assert!(engine.statuses().get("after").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_a_schedule_cancels_its_timer_first() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "wait"));
        graph.add_node(Node::new("d", "count"));
        graph.add_edge(Edge::new("e1", "s", "d"));
        graph.add_edge(Edge::new("e2", "d", "s"));

        let count = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            graph,
            ExecutorRegistry::new().with("count", counter_executor(Arc::clone(&count))),
        );

        engine.execute_node("s", false).await;
        assert_eq!(engine.scheduled_node_ids(), vec!["s"]);

        let removed = engine.delete_node("s");
        assert_eq!(removed.map(|node| node.id), Some("s".to_string()));
        assert!(engine.scheduled_node_ids().is_empty());
        assert!(engine.graph().edges().is_empty());
        assert!(engine.statuses().get("s").is_none());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_keeps_a_single_timer() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "wait"));
        graph.add_node(Node::new("d", "count"));
        graph.add_edge(Edge::new("e1", "s", "d"));

        let count = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            graph,
            ExecutorRegistry::new().with("count", counter_executor(Arc::clone(&count))),
        );

        engine.execute_node("s", false).await;
        engine.execute_node("s", false).await;
        assert_eq!(engine.scheduled_node_ids().len(), 1);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        engine.stop_execution();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_cancels_itself_when_running_flag_is_cleared() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "wait"));
        graph.add_node(Node::new("d", "count"));
        graph.add_edge(Edge::new("e1", "s", "d"));

        let count = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            graph,
            ExecutorRegistry::new().with("count", counter_executor(Arc::clone(&count))),
        );

        engine.execute_node("s", false).await;
        engine.inner.running.store(false, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(engine.scheduled_node_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_from_a_superseded_run_writes_nothing() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "wait"));
        graph.add_node(Node::new("d", "count"));
        graph.add_edge(Edge::new("e1", "s", "d"));

        let count = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(
            graph,
            ExecutorRegistry::new().with("count", counter_executor(Arc::clone(&count))),
        );

        engine.execute_node("s", false).await;
        assert!(engine.is_running());
        {
            // a newer run took over while this timer stayed registered
            let mut token = engine.inner.run_token.lock();
            token.cancel();
            *token = CancellationToken::new();
        }

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(engine.statuses().get("d").is_none());
        assert!(engine.scheduled_node_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_the_last_schedule_settles_the_running_flag() {
        let graph = GraphStore::new();
        graph.add_node(schedule_node("s", true, "wait"));
        graph.add_node(schedule_node("t", true, "wait"));
        let engine = engine_with(graph, ExecutorRegistry::new());

        engine.execute_workflow(&[]).await;
        assert!(engine.is_running());

        engine.delete_node("s");
        assert!(engine.is_running());
        engine.delete_node("t");
        assert!(!engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn step_delay_holds_node_in_running() {
        let graph = GraphStore::new();
        graph.add_node(Node::new("a", "plain"));
        let engine = ExecutionEngine::new(
            Arc::new(graph),
            Arc::new(StatusTracker::new()),
            ExecutorRegistry::new(),
            EngineConfig { step_delay_ms: 200 },
        );

        let background = engine.clone();
        let run = tokio::spawn(async move { background.execute_node("a", false).await });
        settle().await;
        assert_eq!(engine.status("a"), NodeStatus::Running);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.status("a"), NodeStatus::Running);

        assert!(run.await.unwrap());
        assert_eq!(engine.status("a"), NodeStatus::Success);
    }
}
