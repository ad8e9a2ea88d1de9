//! Integration tests for the route resynchronizer
//!
//! These tests drive the public API against the in-memory stub service and
//! cover:
//! - Failure absorption for every platform call
//! - Stream release on every exit path
//! - Step ordering and the silent buffer format
//! - Volume restoration, repeatability and concurrent calls

use std::sync::Arc;
use std::thread;

use route_resync::backend::{FaultPlan, StreamEvent, StubAudioService, StubTimeSource};
use route_resync::route::{
    BITS_PER_SAMPLE, CHANNEL_COUNT, MAX_SILENCE_DURATION_MS, MIN_SILENCE_DURATION_MS,
    SAMPLE_RATE_HZ,
};
use route_resync::telemetry::{ResyncEvent, TelemetryCollector};
use route_resync::{ResyncConfig, RouteResynchronizer, StepStatus, StreamFormat};

fn resynchronizer() -> (RouteResynchronizer, Arc<TelemetryCollector>) {
    let collector = Arc::new(TelemetryCollector::default());
    let resynchronizer = RouteResynchronizer::new(ResyncConfig::default())
        .with_time_source(Arc::new(StubTimeSource::new()))
        .with_telemetry(collector.clone());
    (resynchronizer, collector)
}

fn single_fault(apply: impl Fn(&mut FaultPlan)) -> FaultPlan {
    let mut plan = FaultPlan::none();
    apply(&mut plan);
    plan
}

fn every_fault_plan() -> Vec<(&'static str, FaultPlan)> {
    vec![
        ("volume_query", single_fault(|p| p.volume_query = true)),
        ("volume_update", single_fault(|p| p.volume_update = true)),
        ("open", single_fault(|p| p.open = true)),
        ("write", single_fault(|p| p.write = true)),
        ("start", single_fault(|p| p.start = true)),
        ("stop", single_fault(|p| p.stop = true)),
        ("all", FaultPlan::all()),
    ]
}

/// Injected failures never escape `resync`
#[test]
fn test_failures_are_absorbed() {
    for (name, plan) in every_fault_plan() {
        let (resynchronizer, collector) = resynchronizer();
        let service = StubAudioService::with_faults(plan);

        let outcome = resynchronizer.resync(&service);

        assert!(
            !outcome.fully_applied(),
            "fault {name} should prevent a full nudge"
        );
        assert!(
            collector.snapshot().step_failures >= 1,
            "fault {name} should be reported to telemetry"
        );
    }
}

/// The transient stream is released exactly once on every path
#[test]
fn test_stream_released_on_every_path() {
    let mut plans = every_fault_plan();
    plans.push(("none", FaultPlan::none()));

    for (name, plan) in plans {
        let (resynchronizer, _) = resynchronizer();
        let service = StubAudioService::with_faults(plan);

        resynchronizer.resync(&service);

        assert_eq!(service.active_streams(), 0, "leak with fault {name}");
        assert_eq!(
            service.opened_streams(),
            service.released_streams(),
            "unbalanced release with fault {name}"
        );
        let releases = service
            .journal()
            .iter()
            .filter(|record| record.event == StreamEvent::Released)
            .count() as u64;
        assert_eq!(releases, service.opened_streams(), "fault {name}");
    }
}

/// Scenario: working service, stream lifecycle runs in order
#[test]
fn test_stream_lifecycle_order() {
    let (resynchronizer, _) = resynchronizer();
    let service = StubAudioService::new();

    let outcome = resynchronizer.resync(&service);

    assert_eq!(outcome.volume, StepStatus::Applied);
    assert_eq!(outcome.silence, StepStatus::Applied);
    assert_eq!(
        service.events_for(0),
        vec![
            StreamEvent::Allocated {
                format: StreamFormat::MEDIA
            },
            StreamEvent::Written {
                samples: 8820,
                silent: true
            },
            StreamEvent::Started,
            StreamEvent::Stopped,
            StreamEvent::Released,
        ]
    );
}

/// Scenario: allocation fails, the volume step still runs
#[test]
fn test_allocation_failure_keeps_volume_step() {
    let (resynchronizer, collector) = resynchronizer();
    let service = StubAudioService::with_faults(single_fault(|p| p.open = true));

    let outcome = resynchronizer.resync(&service);

    assert_eq!(outcome.volume, StepStatus::Applied);
    assert_eq!(outcome.silence, StepStatus::Failed);
    assert_eq!(service.volume_writes(), 1);
    assert_eq!(service.opened_streams(), 0);
    assert_eq!(service.active_streams(), 0);

    let snapshot = collector.snapshot();
    assert!(snapshot.recent.iter().any(|event| matches!(
        event,
        ResyncEvent::StepFailed { code: 3005, .. }
    )));
}

/// A failed volume step does not stop the silent cycle
#[test]
fn test_volume_failure_keeps_silent_cycle() {
    let (resynchronizer, _) = resynchronizer();
    let service = StubAudioService::with_faults(single_fault(|p| p.volume_query = true));

    let outcome = resynchronizer.resync(&service);

    assert_eq!(outcome.volume, StepStatus::Failed);
    assert_eq!(outcome.silence, StepStatus::Applied);
    assert_eq!(service.volume_writes(), 0);
}

/// A failed write still releases without starting
#[test]
fn test_write_failure_releases_without_start() {
    let (resynchronizer, _) = resynchronizer();
    let service = StubAudioService::with_faults(single_fault(|p| p.write = true));

    resynchronizer.resync(&service);

    assert_eq!(
        service.events_for(0),
        vec![
            StreamEvent::Allocated {
                format: StreamFormat::MEDIA
            },
            StreamEvent::Released,
        ]
    );
}

/// Silent buffer format and duration
#[test]
fn test_silent_buffer_format() {
    assert_eq!(StreamFormat::MEDIA.sample_rate, SAMPLE_RATE_HZ);
    assert_eq!(SAMPLE_RATE_HZ, 44_100);
    assert_eq!(CHANNEL_COUNT, 2);
    assert_eq!(BITS_PER_SAMPLE, 16);

    for duration_ms in [1, MIN_SILENCE_DURATION_MS, 100, MAX_SILENCE_DURATION_MS, 5_000] {
        let collector = Arc::new(TelemetryCollector::default());
        let resynchronizer = RouteResynchronizer::new(ResyncConfig {
            silence_duration_ms: duration_ms,
            ..ResyncConfig::default()
        })
        .with_time_source(Arc::new(StubTimeSource::new()))
        .with_telemetry(collector);
        let service = StubAudioService::new();

        resynchronizer.resync(&service);

        let written = service
            .events_for(0)
            .into_iter()
            .find_map(|event| match event {
                StreamEvent::Written { samples, silent } => Some((samples, silent)),
                _ => None,
            })
            .expect("silent buffer written");

        let (samples, silent) = written;
        assert!(silent, "buffer must be all zeros");
        assert_eq!(samples % CHANNEL_COUNT as usize, 0);

        let frames = samples as u64 / CHANNEL_COUNT as u64;
        let played_ms = frames * 1000 / SAMPLE_RATE_HZ as u64;
        assert!(
            (MIN_SILENCE_DURATION_MS..=MAX_SILENCE_DURATION_MS).contains(&played_ms),
            "duration {played_ms} ms out of bounds for configured {duration_ms} ms"
        );
    }
}

/// Media volume is bit-identical after the call
#[test]
fn test_volume_restored() {
    for level in [0, 1, 7, 15, i32::MAX] {
        let (resynchronizer, _) = resynchronizer();
        let service = StubAudioService::new().with_volume(level);

        resynchronizer.resync(&service);

        assert_eq!(service.volume(), level);
        assert_eq!(service.volume_writes(), 1);
    }
}

/// Repeated calls have the same independent effect
#[test]
fn test_repeated_calls_are_independent() {
    let (resynchronizer, collector) = resynchronizer();
    let service = StubAudioService::new();

    let outcomes: Vec<_> = (0..5).map(|_| resynchronizer.resync(&service)).collect();

    assert!(outcomes.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(service.volume_writes(), 5);
    assert_eq!(service.opened_streams(), 5);
    assert_eq!(service.active_streams(), 0);
    for id in 0..5 {
        assert_eq!(service.events_for(id).len(), 5, "stream {id}");
    }
    assert_eq!(collector.snapshot().completed, 5);
}

/// Scenario: near-simultaneous calls on one service do not interfere
#[test]
fn test_concurrent_calls_complete_independently() {
    let service = Arc::new(StubAudioService::new());
    let resynchronizer = Arc::new(
        RouteResynchronizer::new(ResyncConfig::default())
            .with_telemetry(Arc::new(TelemetryCollector::default())),
    );

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let resynchronizer = Arc::clone(&resynchronizer);
            thread::spawn(move || resynchronizer.resync(service.as_ref()))
        })
        .collect();

    for handle in handles {
        let outcome = handle.join().expect("resync thread panicked");
        assert!(outcome.fully_applied());
    }

    assert_eq!(service.opened_streams(), 2);
    assert_eq!(service.active_streams(), 0);
    for id in 0..2 {
        let events = service.events_for(id);
        assert_eq!(events.first(), Some(&StreamEvent::Allocated {
            format: StreamFormat::MEDIA
        }));
        assert_eq!(events.last(), Some(&StreamEvent::Released));
        assert_eq!(events.len(), 5, "stream {id} saw foreign events");
    }
}
