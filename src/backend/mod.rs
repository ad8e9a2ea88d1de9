//! Platform audio service abstractions for the route resynchronizer.
//!
//! The resynchronizer never reaches into ambient platform state. Callers hand
//! it an [`AudioService`] borrowed for the duration of one call, which keeps
//! the nudge testable against [`StubAudioService`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::ResyncError;
use crate::route::StreamFormat;

/// Platform audio management service (Android `AudioManager`, desktop host).
///
/// Implementations must be usable from several threads at once; concurrent
/// resyncs share one service and each open their own stream.
pub trait AudioService: Send + Sync {
    /// Current volume index of the primary media stream.
    fn media_volume(&self) -> Result<i32, ResyncError>;

    /// Write a volume index to the primary media stream without UI feedback.
    fn set_media_volume(&self, level: i32) -> Result<(), ResyncError>;

    /// Allocate a transient output stream in the given format.
    ///
    /// The returned stream is released when dropped.
    fn open_output_stream(
        &self,
        format: &StreamFormat,
    ) -> Result<Box<dyn OutputStream + '_>, ResyncError>;
}

/// Short-lived output stream used for the silent playback cycle.
pub trait OutputStream {
    /// Queue interleaved samples; returns how many samples were accepted.
    fn write(&mut self, samples: &[i16]) -> Result<usize, ResyncError>;
    fn start(&mut self) -> Result<(), ResyncError>;
    fn stop(&mut self) -> Result<(), ResyncError>;
}

/// Trait representing a monotonic time source used for pacing the nudge.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Default time source backed by `Instant::now` and `thread::sleep`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// One-shot initialization gate.
///
/// `claim` admits exactly one initializer. `is_ready` only turns true once
/// that initializer has finished and called `mark_ready`, so readers never
/// observe a half-initialized resource.
#[cfg_attr(not(target_os = "android"), allow(dead_code))]
pub(crate) struct InitGate {
    claimed: AtomicBool,
    ready: AtomicBool,
}

#[cfg_attr(not(target_os = "android"), allow(dead_code))]
impl InitGate {
    pub(crate) const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        }
    }

    /// True for the first caller only.
    pub(crate) fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        mod oboe;
        pub use self::oboe::{initialize_android_context, AndroidAudioService};

        /// Audio service type for the current target.
        pub type PlatformAudioService = AndroidAudioService;

        /// Obtain the platform audio service from the initialized Android context.
        pub fn default_service() -> Result<PlatformAudioService, ResyncError> {
            AndroidAudioService::from_android_context()
        }
    } else {
        mod cpal;
        pub use self::cpal::{output_devices, CpalAudioService, OutputDeviceInfo};

        /// Audio service type for the current target.
        pub type PlatformAudioService = CpalAudioService;

        /// Obtain the platform audio service for the default desktop host.
        pub fn default_service() -> Result<PlatformAudioService, ResyncError> {
            Ok(CpalAudioService::new())
        }
    }
}

mod stub;
pub use stub::{FaultPlan, StreamEvent, StreamRecord, StubAudioService, StubTimeSource};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_init_gate_not_ready_until_marked() {
        let gate = InitGate::new();

        assert!(gate.claim());
        assert!(!gate.is_ready(), "claimed but unfinished init must not read as ready");
        assert!(!gate.claim());

        gate.mark_ready();
        assert!(gate.is_ready());
        assert!(!gate.claim());
    }

    #[test]
    fn test_init_gate_admits_one_initializer() {
        let gate = Arc::new(InitGate::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.claim())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(!gate.is_ready());
    }
}
