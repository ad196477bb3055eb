/// Per-node run status tracking
///
/// The status map is the single source of truth observers read. Entries are
/// created lazily on the first write and only removed when the node is deleted.
/// Every write is also broadcast so observers can react without polling.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Capacity of the status event broadcast; slow observers see `Lagged`
const EVENT_BUFFER: usize = 256;

/// Run status of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Idle,
    Running,
    Success,
    Error,
    Warning,
}

/// Status plus the time it was written
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: NodeStatus,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast notification for a single status write
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub node_id: String,
    pub status: NodeStatus,
    pub timestamp: DateTime<Utc>,
}

/// Node id → status map with change notifications
#[derive(Debug)]
pub struct StatusTracker {
    entries: Mutex<HashMap<String, StatusEntry>>,
    events: broadcast::Sender<StatusEvent>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Unconditional write with a fresh timestamp
    pub fn update(&self, node_id: &str, status: NodeStatus) {
        let timestamp = Utc::now();
        self.entries
            .lock()
            .insert(node_id.to_string(), StatusEntry { status, timestamp });

        tracing::debug!("🔄 Node '{}' → {:?}", node_id, status);
        // no receivers is fine
        let _ = self.events.send(StatusEvent {
            node_id: node_id.to_string(),
            status,
            timestamp,
        });
    }

    pub fn get(&self, node_id: &str) -> Option<StatusEntry> {
        self.entries.lock().get(node_id).copied()
    }

    /// Status of a node, `Idle` if it was never written
    pub fn status_of(&self, node_id: &str) -> NodeStatus {
        self.get(node_id).map(|entry| entry.status).unwrap_or(NodeStatus::Idle)
    }

    pub fn snapshot(&self) -> HashMap<String, StatusEntry> {
        self.entries.lock().clone()
    }

    /// Force every known node back to `Idle`
    pub fn reset_all(&self) {
        let ids: Vec<String> = self.entries.lock().keys().cloned().collect();
        for id in ids {
            self.update(&id, NodeStatus::Idle);
        }
    }

    /// Drop the entry for a deleted node
    pub fn remove(&self, node_id: &str) -> Option<StatusEntry> {
        self.entries.lock().remove(node_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_created_lazily() {
        let tracker = StatusTracker::new();
        assert!(tracker.get("a").is_none());
        assert_eq!(tracker.status_of("a"), NodeStatus::Idle);

        tracker.update("a", NodeStatus::Running);
        assert_eq!(tracker.status_of("a"), NodeStatus::Running);
        assert_eq!(tracker.snapshot().len(), 1);
    }

    #[test]
    fn reset_all_only_touches_known_nodes() {
        let tracker = StatusTracker::new();
        tracker.update("a", NodeStatus::Success);
        tracker.update("b", NodeStatus::Error);

        tracker.reset_all();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.values().all(|entry| entry.status == NodeStatus::Idle));
    }

    #[test]
    fn remove_drops_entry() {
        let tracker = StatusTracker::new();
        tracker.update("a", NodeStatus::Warning);
        assert!(tracker.remove("a").is_some());
        assert!(tracker.get("a").is_none());
    }

    #[tokio::test]
    async fn writes_are_broadcast() {
        let tracker = StatusTracker::new();
        let mut events = tracker.subscribe();

        tracker.update("a", NodeStatus::Running);
        tracker.update("a", NodeStatus::Success);

        assert_eq!(events.recv().await.unwrap().status, NodeStatus::Running);
        let second = events.recv().await.unwrap();
        assert_eq!(second.node_id, "a");
        assert_eq!(second.status, NodeStatus::Success);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(NodeStatus::Warning).unwrap(), "warning");
    }
}
