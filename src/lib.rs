/// Flowcore: execution core for node-based automation graphs
///
/// This library provides the in-memory graph store, per-node status tracking,
/// recurring schedule timers, a sequential depth-first execution engine and
/// a reconnecting channel to an external webhook relay.

// Core configuration and setup
pub mod config;

// Graph model, graph store and document persistence
pub mod workflow;

// Execution engine, schedules, statuses and node-kind executors
pub mod runtime;

// Duplex channel to the external webhook relay
pub mod relay;

// HTTP API layer - graph editing, execution control and relay endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use relay::{RelayChannel, RelayError, WebhookRegistration};
pub use runtime::{ExecutionEngine, ExecutorRegistry, NodeExecutor, NodeStatus, StatusTracker};
pub use server::start_server;
pub use workflow::{Edge, GraphStore, Node, WorkflowDocument};
