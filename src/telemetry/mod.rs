//! Resync telemetry collector and helpers.
//!
//! The collector keeps a bounded history of resync events, per-kind counters,
//! and a broadcast channel for live subscribers. It is the only completion
//! signal besides the returned outcome; nobody is required to listen.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

pub mod events;

pub use events::{LifecyclePhase, ResyncEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryCollector> = Lazy::new(TelemetryCollector::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryCollector {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<ResyncEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
    pub completed: u64,
    pub step_failures: u64,
    pub coalesced: u64,
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<ResyncEvent>,
    history: Mutex<VecDeque<ResyncEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
    completed: AtomicU64,
    step_failures: AtomicU64,
    coalesced: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            step_failures: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: ResyncEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        match &event {
            ResyncEvent::Completed { .. } => self.completed.fetch_add(1, Ordering::Relaxed),
            ResyncEvent::StepFailed { .. } => self.step_failures.fetch_add(1, Ordering::Relaxed),
            ResyncEvent::Coalesced { .. } => self.coalesced.fetch_add(1, Ordering::Relaxed),
            ResyncEvent::JniLifecycle { .. } => 0,
        };

        if self.history_capacity > 0 {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        // No subscribers is the common case.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResyncEvent> {
        self.tx.subscribe()
    }

    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        self.publish(ResyncEvent::lifecycle(phase));
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            step_failures: self.step_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(64, 32)
    }
}

pub(crate) fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
