//! RouteResynchronizer - the two-step routing nudge
//!
//! Step order is fixed: volume perturbation first, then the silent playback
//! cycle. Both are attempted on every call regardless of how the other went.
//! Nothing here returns an error to the caller; the outcome only signals
//! which steps took effect.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::backend::{AudioService, OutputStream, SystemTimeSource, TimeSource};
use crate::config::ResyncConfig;
use crate::error::{log_resync_error, ErrorCode, ResyncError};
use crate::telemetry::{self, ResyncEvent, TelemetryCollector};

use super::{SilentBuffer, StreamFormat};

/// Sub-step of the nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncStep {
    Volume,
    Silence,
}

impl ResyncStep {
    fn context(&self) -> &'static str {
        match self {
            ResyncStep::Volume => "volume perturbation",
            ResyncStep::Silence => "silent playback",
        }
    }
}

/// How a sub-step ended. Error details go to the log and telemetry only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The platform accepted the step
    Applied,
    /// The platform has no API for this step
    Unsupported,
    /// The step was attempted and failed
    Failed,
    /// The step was not attempted (disabled or coalesced)
    Skipped,
}

/// Completion signal of one resync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncOutcome {
    pub volume: StepStatus,
    pub silence: StepStatus,
    /// Another call was in flight or completed too recently
    pub coalesced: bool,
    pub elapsed_ms: u64,
}

impl ResyncOutcome {
    pub fn skipped() -> Self {
        Self {
            volume: StepStatus::Skipped,
            silence: StepStatus::Skipped,
            coalesced: false,
            elapsed_ms: 0,
        }
    }

    pub fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::skipped()
        }
    }

    /// Both steps were applied.
    pub fn fully_applied(&self) -> bool {
        self.volume == StepStatus::Applied && self.silence == StepStatus::Applied
    }

    /// At least one step reached the platform successfully.
    pub fn any_applied(&self) -> bool {
        self.volume == StepStatus::Applied || self.silence == StepStatus::Applied
    }
}

/// Forces the platform audio routing layer to re-bind to the current device.
///
/// Holds configuration only; every call is self-contained and the service
/// handle is borrowed for the call and never retained. Safe to share across
/// threads and to call repeatedly.
///
/// # Example
/// ```ignore
/// let resynchronizer = RouteResynchronizer::default();
/// let outcome = resynchronizer.resync(&service);
/// ```
pub struct RouteResynchronizer {
    config: ResyncConfig,
    time: Arc<dyn TimeSource>,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl Default for RouteResynchronizer {
    fn default() -> Self {
        Self::new(ResyncConfig::default())
    }
}

impl RouteResynchronizer {
    pub fn new(config: ResyncConfig) -> Self {
        Self {
            config: config.validated(),
            time: Arc::new(SystemTimeSource::default()),
            telemetry: None,
        }
    }

    /// Replace the clock used for pre-delay and drain waits.
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Publish events to a private collector instead of the global hub.
    pub fn with_telemetry(mut self, collector: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(collector);
        self
    }

    pub fn config(&self) -> &ResyncConfig {
        &self.config
    }

    pub(crate) fn time(&self) -> &dyn TimeSource {
        self.time.as_ref()
    }

    pub(crate) fn publish(&self, event: ResyncEvent) {
        match &self.telemetry {
            Some(collector) => collector.publish(event),
            None => telemetry::hub().publish(event),
        }
    }

    /// Run the nudge against `service`.
    ///
    /// Blocks for roughly the silent buffer's duration when draining is
    /// enabled. Never fails and never panics on platform errors.
    pub fn resync<S: AudioService + ?Sized>(&self, service: &S) -> ResyncOutcome {
        if !self.config.enabled {
            info!("[RouteResync] Disabled by configuration, skipping");
            let outcome = ResyncOutcome::skipped();
            self.publish(ResyncEvent::completed(outcome));
            return outcome;
        }

        let started = self.time.now();

        if !self.config.pre_delay().is_zero() {
            debug!(
                "[RouteResync] Waiting {} ms before nudging",
                self.config.pre_delay_ms
            );
            self.time.sleep(self.config.pre_delay());
        }

        let volume = self.nudge_volume(service);
        let silence = self.play_silence(service);

        let outcome = ResyncOutcome {
            volume,
            silence,
            coalesced: false,
            elapsed_ms: self.time.now().duration_since(started).as_millis() as u64,
        };

        info!(
            "[RouteResync] Audio routing retriggered: volume={:?}, silence={:?}, elapsed={}ms",
            outcome.volume, outcome.silence, outcome.elapsed_ms
        );
        self.publish(ResyncEvent::completed(outcome));
        outcome
    }

    /// Resync when the service was obtained, absorbing the lookup failure otherwise.
    pub fn resync_if_available<S: AudioService>(
        &self,
        service: Result<S, ResyncError>,
    ) -> ResyncOutcome {
        match service {
            Ok(service) => self.resync(&service),
            Err(err) if !self.config.enabled => {
                debug!("[RouteResync] Disabled; ignoring service lookup error: {}", err);
                let outcome = ResyncOutcome::skipped();
                self.publish(ResyncEvent::completed(outcome));
                outcome
            }
            Err(err) => {
                // One lookup failure takes out both steps; report it once.
                let status = self.absorb(ResyncStep::Volume, &err);
                let outcome = ResyncOutcome {
                    volume: status,
                    silence: status,
                    coalesced: false,
                    elapsed_ms: 0,
                };
                self.publish(ResyncEvent::completed(outcome));
                outcome
            }
        }
    }

    /// Read the media volume and write the same value back.
    fn nudge_volume<S: AudioService + ?Sized>(&self, service: &S) -> StepStatus {
        let level = match service.media_volume() {
            Ok(level) => level,
            Err(err) => return self.absorb(ResyncStep::Volume, &err),
        };

        match service.set_media_volume(level) {
            Ok(()) => {
                debug!("[RouteResync] Media volume re-applied at {}", level);
                StepStatus::Applied
            }
            Err(err) => self.absorb(ResyncStep::Volume, &err),
        }
    }

    /// Allocate a throwaway stream, play silence through it, release it.
    fn play_silence<S: AudioService + ?Sized>(&self, service: &S) -> StepStatus {
        let buffer = SilentBuffer::new(StreamFormat::MEDIA, self.config.silence_duration());

        let mut stream = match service.open_output_stream(buffer.format()) {
            Ok(stream) => stream,
            Err(err) => return self.absorb(ResyncStep::Silence, &err),
        };

        let status = match self.run_silent_cycle(stream.as_mut(), &buffer) {
            Ok(()) => StepStatus::Applied,
            Err(err) => self.absorb(ResyncStep::Silence, &err),
        };

        // Dropping the box releases the stream, whichever stage failed.
        drop(stream);
        debug!("[RouteResync] Silent stream released");

        status
    }

    fn run_silent_cycle(
        &self,
        stream: &mut (dyn OutputStream + '_),
        buffer: &SilentBuffer,
    ) -> Result<(), ResyncError> {
        let accepted = stream.write(buffer.samples())?;
        if accepted < buffer.samples().len() {
            debug!(
                "[RouteResync] Stream accepted {} of {} silent samples",
                accepted,
                buffer.samples().len()
            );
        }

        stream.start()?;

        if self.config.drain_before_stop {
            self.time.sleep(buffer.duration());
        }

        stream.stop()
    }

    fn absorb(&self, step: ResyncStep, err: &ResyncError) -> StepStatus {
        log_resync_error(err, step.context());
        self.publish(ResyncEvent::step_failed(step, err.code(), err.message()));

        match err {
            ResyncError::Unsupported { .. } => StepStatus::Unsupported,
            _ => StepStatus::Failed,
        }
    }
}
