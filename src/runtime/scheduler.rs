/// Recurring schedule registry
///
/// Tracks one live timer per schedule node. Arming a node that already has a
/// timer replaces (and thereby cancels) the previous one. Handles abort their
/// timer task when dropped, so removing an entry from the map is all it takes
/// to cancel it: on global stop, on node deletion and on re-arm alike.

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::task::JoinHandle;

/// `initialBehavior` value that fans out once as soon as the schedule is armed
pub const EXECUTE_IMMEDIATELY: &str = "execute";

/// Unit of a schedule node's `intervalUnit` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "seconds" => Some(Self::Seconds),
            "minutes" => Some(Self::Minutes),
            "hours" => Some(Self::Hours),
            "days" => Some(Self::Days),
            _ => None,
        }
    }

    /// Milliseconds per unit
    pub fn millis(self) -> u64 {
        match self {
            Self::Seconds => 1_000,
            Self::Minutes => 60_000,
            Self::Hours => 3_600_000,
            Self::Days => 86_400_000,
        }
    }
}

/// Parsed timing configuration of an active schedule node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleSpec {
    pub interval: Duration,
    /// Fan out once right away on the initial (non-scheduled) run
    pub execute_initially: bool,
}

impl ScheduleSpec {
    /// Read `intervalValue`, `intervalUnit` and `initialBehavior` from node data
    ///
    /// `intervalValue` may be a number or a numeric string (form input) and
    /// must be positive.
    pub fn from_data(data: &Map<String, Value>) -> Result<Self> {
        let value = match data.get("intervalValue") {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|value| value.is_finite() && *value > 0.0)
        .ok_or_else(|| anyhow::anyhow!("Schedule needs a positive 'intervalValue'"))?;

        let unit_name = data
            .get("intervalUnit")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Schedule is missing 'intervalUnit'"))?;
        let unit = IntervalUnit::parse(unit_name)
            .ok_or_else(|| anyhow::anyhow!("Unknown schedule interval unit: {}", unit_name))?;

        let millis = (value * unit.millis() as f64).round().max(1.0) as u64;

        Ok(Self {
            interval: Duration::from_millis(millis),
            execute_initially: data.get("initialBehavior").and_then(Value::as_str)
                == Some(EXECUTE_IMMEDIATELY),
        })
    }
}

/// Owned handle of a running timer task; aborts the task when dropped
#[derive(Debug)]
pub struct ScheduleHandle {
    timer_id: u64,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn new(timer_id: u64, task: JoinHandle<()>) -> Self {
        Self { timer_id, task }
    }

    pub fn timer_id(&self) -> u64 {
        self.timer_id
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Node id → live timer
#[derive(Debug, Default)]
pub struct SchedulerRegistry {
    timers: Mutex<HashMap<String, ScheduleHandle>>,
    next_timer_id: AtomicU64,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a timer about to be armed
    pub fn next_timer_id(&self) -> u64 {
        self.next_timer_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a timer, cancelling any previous one for the same node
    pub fn arm(&self, node_id: &str, handle: ScheduleHandle) {
        let previous = self.timers.lock().insert(node_id.to_string(), handle);
        if previous.is_some() {
            tracing::debug!("🛑 Replaced existing timer for schedule '{}'", node_id);
        }
        drop(previous);
    }

    /// Cancel and unregister the timer for a node; returns whether one existed
    pub fn cancel(&self, node_id: &str) -> bool {
        let removed = self.timers.lock().remove(node_id);
        let existed = removed.is_some();
        drop(removed);
        if existed {
            tracing::debug!("🛑 Cancelled timer for schedule '{}'", node_id);
        }
        existed
    }

    /// Cancel every timer; returns how many were live
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ScheduleHandle> = self.timers.lock().drain().map(|(_, h)| h).collect();
        let count = drained.len();
        drop(drained);
        count
    }

    /// Unregister a timer only if the entry still belongs to `timer_id`
    ///
    /// Used by a timer deregistering itself; a newer timer armed for the same
    /// node in the meantime is left alone.
    pub fn release(&self, node_id: &str, timer_id: u64) -> bool {
        let released = {
            let mut timers = self.timers.lock();
            match timers.get(node_id) {
                Some(handle) if handle.timer_id() == timer_id => timers.remove(node_id),
                _ => None,
            }
        };
        released.is_some()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.timers.lock().contains_key(node_id)
    }

    pub fn is_empty(&self) -> bool {
        self.timers.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.timers.lock().keys().cloned().collect()
    }
}
