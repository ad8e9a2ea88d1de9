//! Telemetry event types emitted by the route resynchronizer.

use serde::{Deserialize, Serialize};

use crate::route::{ResyncOutcome, ResyncStep};

use super::now_timestamp_ms;

/// Lifecycle stages reported by the JNI entry points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    LibraryLoaded,
    ContextInitialized,
    ContextFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ResyncEvent {
    /// A sub-step failed and was absorbed
    StepFailed {
        step: ResyncStep,
        code: i32,
        message: String,
        timestamp_ms: u64,
    },
    /// A resync call returned
    Completed {
        outcome: ResyncOutcome,
        timestamp_ms: u64,
    },
    /// A call was dropped by the coalescing guard
    Coalesced { timestamp_ms: u64 },
    JniLifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
}

impl ResyncEvent {
    pub fn step_failed(step: ResyncStep, code: i32, message: String) -> Self {
        ResyncEvent::StepFailed {
            step,
            code,
            message,
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn completed(outcome: ResyncOutcome) -> Self {
        ResyncEvent::Completed {
            outcome,
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn coalesced() -> Self {
        ResyncEvent::Coalesced {
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn lifecycle(phase: LifecyclePhase) -> Self {
        ResyncEvent::JniLifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        }
    }
}
