/// Runtime Execution Engine
///
/// This module provides graph execution for workflows. It handles:
/// - Depth-first, edge-ordered traversal from trigger nodes
/// - Per-node status tracking with change notifications
/// - Recurring schedule timers bound to the engine lifecycle
/// - Dispatch to node-kind executors

// Core execution engine
pub mod engine;

// Node-kind executor contract and registry
pub mod executor;

// Recurring timers for schedule nodes
pub mod scheduler;

// Per-node status map
pub mod status;

// Re-export main types
pub use engine::ExecutionEngine;
pub use executor::{ExecutorRegistry, FnExecutor, Invocation, NodeExecutor};
pub use scheduler::SchedulerRegistry;
pub use status::{NodeStatus, StatusEntry, StatusEvent, StatusTracker};
