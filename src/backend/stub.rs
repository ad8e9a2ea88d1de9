use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{PlaybackStage, ResyncError};
use crate::route::StreamFormat;

use super::{AudioService, OutputStream, TimeSource};

/// Which platform calls the stub service should fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub volume_query: bool,
    pub volume_update: bool,
    pub open: bool,
    pub write: bool,
    pub start: bool,
    pub stop: bool,
}

impl FaultPlan {
    pub fn none() -> Self {
        Self::default()
    }

    /// Every platform call fails.
    pub fn all() -> Self {
        Self {
            volume_query: true,
            volume_update: true,
            open: true,
            write: true,
            start: true,
            stop: true,
        }
    }
}

/// Lifecycle step observed on a stub output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Allocated { format: StreamFormat },
    Written { samples: usize, silent: bool },
    Started,
    Stopped,
    Released,
}

/// Journal entry tying a lifecycle step to the stream it happened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub stream_id: u64,
    pub event: StreamEvent,
}

/// In-memory audio service for tests and CLI dry runs.
///
/// Tracks the number of live output streams so leaks show up as a non-zero
/// count, and journals every stream lifecycle step in call order.
pub struct StubAudioService {
    volume: AtomicI32,
    volume_writes: AtomicU64,
    faults: FaultPlan,
    next_stream_id: AtomicU64,
    active_streams: AtomicI64,
    released_streams: AtomicU64,
    journal: Mutex<Vec<StreamRecord>>,
}

impl StubAudioService {
    pub fn new() -> Self {
        Self::with_faults(FaultPlan::none())
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            volume: AtomicI32::new(7),
            volume_writes: AtomicU64::new(0),
            faults,
            next_stream_id: AtomicU64::new(0),
            active_streams: AtomicI64::new(0),
            released_streams: AtomicU64::new(0),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn with_volume(self, level: i32) -> Self {
        self.volume.store(level, Ordering::SeqCst);
        self
    }

    pub fn volume(&self) -> i32 {
        self.volume.load(Ordering::SeqCst)
    }

    pub fn volume_writes(&self) -> u64 {
        self.volume_writes.load(Ordering::SeqCst)
    }

    /// Streams allocated and not yet released.
    pub fn active_streams(&self) -> i64 {
        self.active_streams.load(Ordering::SeqCst)
    }

    pub fn opened_streams(&self) -> u64 {
        self.next_stream_id.load(Ordering::SeqCst)
    }

    pub fn released_streams(&self) -> u64 {
        self.released_streams.load(Ordering::SeqCst)
    }

    pub fn journal(&self) -> Vec<StreamRecord> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lifecycle steps recorded for one stream, in order.
    pub fn events_for(&self, stream_id: u64) -> Vec<StreamEvent> {
        self.journal()
            .into_iter()
            .filter(|record| record.stream_id == stream_id)
            .map(|record| record.event)
            .collect()
    }

    fn record(&self, stream_id: u64, event: StreamEvent) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StreamRecord { stream_id, event });
    }
}

impl Default for StubAudioService {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioService for StubAudioService {
    fn media_volume(&self) -> Result<i32, ResyncError> {
        if self.faults.volume_query {
            return Err(ResyncError::VolumeQueryFailed {
                reason: "injected fault".to_string(),
            });
        }
        Ok(self.volume.load(Ordering::SeqCst))
    }

    fn set_media_volume(&self, level: i32) -> Result<(), ResyncError> {
        if self.faults.volume_update {
            return Err(ResyncError::VolumeUpdateFailed {
                level,
                reason: "injected fault".to_string(),
            });
        }
        self.volume.store(level, Ordering::SeqCst);
        self.volume_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_output_stream(
        &self,
        format: &StreamFormat,
    ) -> Result<Box<dyn OutputStream + '_>, ResyncError> {
        if self.faults.open {
            return Err(ResyncError::StreamOpenFailed {
                reason: "injected fault: format not supported".to_string(),
            });
        }

        let id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.active_streams.fetch_add(1, Ordering::SeqCst);
        self.record(id, StreamEvent::Allocated { format: *format });

        Ok(Box::new(StubStream { service: self, id }))
    }
}

struct StubStream<'a> {
    service: &'a StubAudioService,
    id: u64,
}

impl StubStream<'_> {
    fn fail(&self, fault: bool, stage: PlaybackStage) -> Result<(), ResyncError> {
        if fault {
            return Err(ResyncError::PlaybackFailed {
                stage,
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }
}

impl OutputStream for StubStream<'_> {
    fn write(&mut self, samples: &[i16]) -> Result<usize, ResyncError> {
        self.fail(self.service.faults.write, PlaybackStage::Write)?;
        self.service.record(
            self.id,
            StreamEvent::Written {
                samples: samples.len(),
                silent: samples.iter().all(|&sample| sample == 0),
            },
        );
        Ok(samples.len())
    }

    fn start(&mut self) -> Result<(), ResyncError> {
        self.fail(self.service.faults.start, PlaybackStage::Start)?;
        self.service.record(self.id, StreamEvent::Started);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ResyncError> {
        self.fail(self.service.faults.stop, PlaybackStage::Stop)?;
        self.service.record(self.id, StreamEvent::Stopped);
        Ok(())
    }
}

impl Drop for StubStream<'_> {
    fn drop(&mut self) {
        self.service.record(self.id, StreamEvent::Released);
        self.service.active_streams.fetch_sub(1, Ordering::SeqCst);
        self.service.released_streams.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deterministic time source for tests and dry runs.
///
/// `sleep` advances virtual time instead of blocking, so drained playback
/// cycles finish instantly while elapsed times stay meaningful.
pub struct StubTimeSource {
    start: Instant,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    /// Total virtual time slept so far.
    pub fn slept(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        self.start + self.slept()
    }

    fn sleep(&self, duration: Duration) {
        self.offset_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_released_on_drop() {
        let service = StubAudioService::new();
        {
            let stream = service.open_output_stream(&StreamFormat::MEDIA).unwrap();
            assert_eq!(service.active_streams(), 1);
            drop(stream);
        }
        assert_eq!(service.active_streams(), 0);
        assert_eq!(service.released_streams(), 1);
        assert_eq!(
            service.events_for(0),
            vec![
                StreamEvent::Allocated {
                    format: StreamFormat::MEDIA
                },
                StreamEvent::Released
            ]
        );
    }

    #[test]
    fn test_open_fault_allocates_nothing() {
        let service = StubAudioService::with_faults(FaultPlan {
            open: true,
            ..FaultPlan::none()
        });
        assert!(service.open_output_stream(&StreamFormat::MEDIA).is_err());
        assert_eq!(service.opened_streams(), 0);
        assert_eq!(service.active_streams(), 0);
    }

    #[test]
    fn test_volume_write_is_counted() {
        let service = StubAudioService::new().with_volume(11);
        service.set_media_volume(11).unwrap();
        assert_eq!(service.volume(), 11);
        assert_eq!(service.volume_writes(), 1);
    }

    #[test]
    fn test_stub_time_source_advances_on_sleep() {
        let time = StubTimeSource::new();
        let before = time.now();
        time.sleep(Duration::from_millis(100));
        assert_eq!(time.now().duration_since(before), Duration::from_millis(100));
        assert_eq!(time.slept(), Duration::from_millis(100));
    }
}
