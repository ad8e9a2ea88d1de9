//! Optional guard that drops overlapping or back-to-back resync calls.
//!
//! Route-change notifications tend to arrive in bursts. Collapsing them
//! saves redundant 100 ms playback cycles; correctness does not depend on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::backend::AudioService;
use crate::telemetry::ResyncEvent;

use super::{ResyncOutcome, RouteResynchronizer};

/// Resets the in-flight flag when the wrapped call returns.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wraps a [`RouteResynchronizer`] and coalesces calls that arrive while one
/// is running or within `coalesce_window_ms` of the last completed one.
pub struct CoalescingResynchronizer {
    inner: RouteResynchronizer,
    in_flight: AtomicBool,
    last_completed: Mutex<Option<Instant>>,
}

impl CoalescingResynchronizer {
    pub fn new(inner: RouteResynchronizer) -> Self {
        Self {
            inner,
            in_flight: AtomicBool::new(false),
            last_completed: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &RouteResynchronizer {
        &self.inner
    }

    pub fn resync<S: AudioService + ?Sized>(&self, service: &S) -> ResyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.coalesce("another resync is in flight");
        }
        let _guard = InFlight(&self.in_flight);

        let window = self.inner.config().coalesce_window();
        if !window.is_zero() {
            let last = *self
                .last_completed
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(last) = last {
                if self.inner.time().now().duration_since(last) < window {
                    return self.coalesce("previous resync completed inside the window");
                }
            }
        }

        let outcome = self.inner.resync(service);

        *self
            .last_completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.inner.time().now());

        outcome
    }

    fn coalesce(&self, reason: &str) -> ResyncOutcome {
        tracing::debug!("[RouteResync] Coalesced: {}", reason);
        self.inner.publish(ResyncEvent::coalesced());
        ResyncOutcome::coalesced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{OutputStream, StubAudioService, StubTimeSource, TimeSource};
    use crate::config::ResyncConfig;
    use crate::error::ResyncError;
    use crate::route::StreamFormat;
    use crate::telemetry::TelemetryCollector;
    use std::sync::Arc;
    use std::time::Duration;

    fn guard(window_ms: u64, time: Arc<StubTimeSource>) -> CoalescingResynchronizer {
        let inner = RouteResynchronizer::new(ResyncConfig {
            coalesce_window_ms: window_ms,
            drain_before_stop: false,
            ..ResyncConfig::default()
        })
        .with_time_source(time)
        .with_telemetry(Arc::new(TelemetryCollector::default()));
        CoalescingResynchronizer::new(inner)
    }

    #[test]
    fn test_zero_window_never_coalesces_sequential_calls() {
        let guard = guard(0, Arc::new(StubTimeSource::new()));
        let service = StubAudioService::new();

        for _ in 0..3 {
            assert!(!guard.resync(&service).coalesced);
        }
        assert_eq!(service.opened_streams(), 3);
    }

    #[test]
    fn test_calls_inside_window_are_coalesced() {
        let time = Arc::new(StubTimeSource::new());
        let guard = guard(500, time.clone());
        let service = StubAudioService::new();

        assert!(!guard.resync(&service).coalesced);
        time.sleep(Duration::from_millis(100));
        assert!(guard.resync(&service).coalesced);
        time.sleep(Duration::from_millis(500));
        assert!(!guard.resync(&service).coalesced);

        assert_eq!(service.opened_streams(), 2);
    }

    /// Service that re-enters the guard from inside the volume step.
    struct Reentrant<'a> {
        guard: &'a CoalescingResynchronizer,
        stub: StubAudioService,
        nested: Mutex<Option<ResyncOutcome>>,
    }

    impl AudioService for Reentrant<'_> {
        fn media_volume(&self) -> Result<i32, ResyncError> {
            let nested = self.guard.resync(&self.stub);
            *self.nested.lock().unwrap() = Some(nested);
            self.stub.media_volume()
        }

        fn set_media_volume(&self, level: i32) -> Result<(), ResyncError> {
            self.stub.set_media_volume(level)
        }

        fn open_output_stream(
            &self,
            format: &StreamFormat,
        ) -> Result<Box<dyn OutputStream + '_>, ResyncError> {
            self.stub.open_output_stream(format)
        }
    }

    #[test]
    fn test_in_flight_call_is_coalesced() {
        let guard = guard(0, Arc::new(StubTimeSource::new()));
        let service = Reentrant {
            guard: &guard,
            stub: StubAudioService::new(),
            nested: Mutex::new(None),
        };

        let outer = guard.resync(&service);

        assert!(outer.fully_applied());
        let nested = service.nested.lock().unwrap().expect("nested call ran");
        assert!(nested.coalesced);
        assert_eq!(service.stub.opened_streams(), 1);

        // flag is cleared once the outer call returns
        assert!(!guard.resync(&service.stub).coalesced);
    }
}
