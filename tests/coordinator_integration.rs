// tests/coordinator_integration.rs
//! End-to-end behaviour of the ingest coordinator

use emg_stream::config::{RmsConfig, StreamConfig};
use emg_stream::coordinator::IngestCoordinator;
use emg_stream::hal::{ConnectionAction, ConnectionEvent};
use emg_stream::utils::MockClock;
use emg_stream::IngestError;
use std::sync::Arc;

fn coordinator_with(config: StreamConfig) -> (IngestCoordinator, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new(0.0));
    let coordinator = IngestCoordinator::new(config, clock.clone()).expect("valid config");
    (coordinator, clock)
}

fn assert_monotonic(stamps: &[f64]) {
    for pair in stamps.windows(2) {
        assert!(
            pair[1] - pair[0] >= 0.002 - 1e-9,
            "timestamps {} -> {} closer than 2 ms",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_gap_fill_boundary() {
    let (mut c, _) = coordinator_with(StreamConfig::default());
    c.ingest(&[1.0], 0.0, false).unwrap();
    c.ingest(&[2.0], 0.35, false).unwrap();

    let rows: Vec<_> = c.series().rows().collect();
    assert_eq!(rows.len(), 4);
    assert!((rows[1].timestamp - 0.1).abs() < 1e-9);
    assert!((rows[2].timestamp - 0.2).abs() < 1e-9);
    assert!((rows[3].timestamp - 0.3).abs() < 1e-9);
    assert!(rows[1].interpolated && rows[2].interpolated);
    assert!(!rows[3].interpolated);
    // smooth blend between the neighbours
    assert!(rows[1].raw > 1.0 && rows[1].raw < rows[2].raw && rows[2].raw < 2.0);
}

#[test]
fn test_fill_after_steady_stream_keeps_uniform_spacing() {
    let (mut c, _) = coordinator_with(StreamConfig::default());
    for i in 0..20 {
        c.ingest(&[1.0], i as f64 * 0.1, false).unwrap();
    }
    // 2.0 and 2.1 lost, 2.2 arrives late
    let report = c.ingest(&[1.0], 2.25, false).unwrap();
    assert_eq!(report.interpolated_inserted, 2);
    for i in 23..33 {
        c.ingest(&[1.0], i as f64 * 0.1, false).unwrap();
    }

    let rows: Vec<_> = c.series().rows().collect();
    assert_eq!(rows.len(), 33);
    let flags: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].interpolated).collect();
    assert_eq!(flags, vec![20, 21]);

    // once the smoothing window is full every step is one period, across the fill too
    for pair in rows[9..].windows(2) {
        let step = pair[1].timestamp - pair[0].timestamp;
        assert!(
            (step - 0.1).abs() < 1e-9,
            "step {step} between {} and {}",
            pair[0].timestamp,
            pair[1].timestamp
        );
    }
}

#[test]
fn test_long_gap_holds_last_value() {
    let (mut c, _) = coordinator_with(StreamConfig::default());
    c.ingest(&[0.7], 0.0, false).unwrap();
    let report = c.ingest(&[3.0], 2.0, false).unwrap();

    assert_eq!(report.interpolated_inserted, 19);
    let held: Vec<f64> = c
        .series()
        .rows()
        .filter(|r| r.interpolated)
        .map(|r| r.raw)
        .collect();
    assert_eq!(held.len(), 19);
    assert!(held.iter().all(|&v| v == 0.7));
}

#[test]
fn test_large_gap_resets_anchor() {
    let (mut c, _) = coordinator_with(StreamConfig::default());
    c.ingest(&[1.0], 0.0, false).unwrap();
    let report = c.ingest(&[1.0], 5.0, false).unwrap();

    assert_eq!(report.interpolated_inserted, 0);
    assert_eq!(c.series().len(), 2);
    assert!((c.expected_anchor().unwrap() - 5.1).abs() < 1e-9);
    assert_eq!(c.stats().discontinuities, 1);
}

#[test]
fn test_messy_stream_stays_aligned_and_monotonic() {
    let (mut c, _) = coordinator_with(StreamConfig::default());

    let mut arrivals: Vec<(f64, f64)> = (0..300)
        .filter(|i| i % 17 != 5)
        .map(|i| {
            let jitter = if i % 2 == 0 { 0.03 } else { -0.03 };
            (i as f64 * 0.1 + jitter, (i % 11) as f64 * 0.1)
        })
        .collect();
    for i in (10..arrivals.len() - 1).step_by(13) {
        arrivals.swap(i, i + 1);
    }

    for (n, &(ts, value)) in arrivals.iter().enumerate() {
        let _ = c.ingest(&[value], ts, false);
        if n % 23 == 0 {
            assert_eq!(
                c.ingest(&[value], ts, false),
                Err(IngestError::DuplicateBatch(ts))
            );
        }
    }

    let series = c.series();
    assert!(series.is_aligned());
    assert!(series.len() >= arrivals.len());
    assert!(c.stats().interpolated_samples > 0);
    let stamps: Vec<f64> = series.timestamps().iter().copied().collect();
    assert_monotonic(&stamps);

    let display: Vec<f64> = c.display().iter().map(|s| s.timestamp).collect();
    assert_monotonic(&display);
}

#[test]
fn test_overflow_trim_to_target() {
    let config = StreamConfig::default();
    let high_water = config.buffers.high_water_mark;
    let target = config.buffers.trim_target;
    let (mut c, _) = coordinator_with(config);

    let mut trimmed = 0;
    for i in 0..high_water + 500 {
        let report = c.ingest(&[(i % 7) as f64], i as f64 * 0.1, false).unwrap();
        trimmed += report.trimmed;
    }

    assert_eq!(c.series().len(), target + 499);
    assert_eq!(trimmed, high_water + 1 - target);
    assert!(c.series().is_aligned());

    // the oldest rows went, the newest stayed: ingest 1001 is now the first row.
    // Stored stamps trail the raw grid by the 0.45 s smoothing lag.
    let first = c.series().rows().next().unwrap();
    assert!((first.timestamp - 99.65).abs() < 1e-6, "first kept at {}", first.timestamp);
    assert_eq!(first.raw, (1001 % 7) as f64);
    let last = c.series().last_timestamp().unwrap();
    assert!((last - 649.45).abs() < 1e-6, "last kept at {last}");
    assert_eq!(c.series().rows().last().unwrap().raw, (6499 % 7) as f64);
    assert!(c.display().len() <= c.config().buffers.display_capacity);
}

#[test]
fn test_calibration_reference_is_frozen() {
    let config = StreamConfig {
        rms: RmsConfig::live(),
        ..StreamConfig::default()
    };
    let (mut c, clock) = coordinator_with(config);

    c.start_calibration();
    for i in 0..20 {
        c.ingest(&[2.0], i as f64 * 0.1, false).unwrap();
    }
    assert_eq!(c.series().len(), 0);
    assert_eq!(c.display().len(), 20);

    clock.set_time(10.0);
    let outcome = c.tick().expect("calibration due");
    assert_eq!(outcome.samples, 20);
    assert!((c.reference() - 2.0).abs() < 1e-12);

    for i in 20..30 {
        c.ingest(&[1.0], i as f64 * 0.1, false).unwrap();
    }
    let last = c.series().rows().last().unwrap();
    assert!((last.percent_reference - 50.0).abs() < 1e-9);

    for i in 30..40 {
        c.ingest(&[4.0], i as f64 * 0.1, false).unwrap();
    }
    assert!((c.reference() - 2.0).abs() < 1e-12);
    let last = c.series().rows().last().unwrap();
    assert!((last.percent_reference - 200.0).abs() < 1e-9);
    assert_eq!(c.percent_history().to_vec().len(), 2);
}

#[test]
fn test_default_reference_ignores_short_spike() {
    let (mut c, clock) = coordinator_with(StreamConfig::default());
    c.start_calibration();
    // nine quiet seconds and one strong second
    for i in 0..100 {
        let value = if (40..50).contains(&i) { 5.0 } else { 1.0 };
        c.ingest(&[value], i as f64 * 0.1, false).unwrap();
    }
    clock.set_time(10.0);
    let outcome = c.tick().expect("calibration due");
    assert_eq!(outcome.samples, 100);
    // max of the one-second RMS values, not the RMS of the whole cycle
    assert!((outcome.reference.unwrap() - 5.0).abs() < 1e-9);
}

#[test]
fn test_exported_percent_follows_reference() {
    let (mut c, clock) = coordinator_with(StreamConfig::default());
    c.start_calibration();
    for i in 0..100 {
        c.ingest(&[4.0], i as f64 * 0.1, false).unwrap();
    }
    clock.set_time(10.0);
    c.tick().expect("calibration due");
    let reference = c.reference();
    assert!((reference - 4.0).abs() < 1e-9);

    for i in 100..160 {
        c.ingest(&[(i % 7) as f64 * 0.5], i as f64 * 0.1, false).unwrap();
    }
    clock.set_time(16.0);
    let text = c.stop_recording_and_export();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[1], "Maximum MVE:,4.000000");
    assert_eq!(lines.len(), 3 + 60);

    let mut windows_seen = 0;
    for line in &lines[3..] {
        let fields: Vec<f64> = line.split(',').map(|f| f.parse().unwrap()).collect();
        let (one_second, percent) = (fields[4], fields[5]);
        assert!(
            (percent - one_second / reference * 100.0).abs() < 1e-3,
            "row {line}"
        );
        if one_second > 0.0 {
            windows_seen += 1;
        }
    }
    assert!(windows_seen > 0);
}

#[test]
fn test_redelivered_timestamps_never_duplicate_rows() {
    let (mut c, _) = coordinator_with(StreamConfig::default());
    for i in 0..3 {
        c.ingest(&[1.0], i as f64 * 0.1, false).unwrap();
    }
    // identical redelivery is refused outright
    assert_eq!(c.ingest(&[1.0], 0.1, false), Err(IngestError::DuplicateBatch(0.1)));
    // a different payload on a repeated timestamp is kept on its own stamp
    c.ingest(&[7.0], 0.2, false).unwrap();

    let text = c.stop_recording_and_export();
    let stamps: Vec<&str> = text
        .lines()
        .skip(3)
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    assert_eq!(stamps.len(), 4);
    assert_eq!(stamps.len(), c.series().len());
    let mut unique = stamps.clone();
    unique.dedup();
    assert_eq!(unique, stamps);
}

#[test]
fn test_reorder_window_consumes_in_timestamp_order() {
    let mut config = StreamConfig::default();
    config.sampling.reorder_window_s = 0.25;
    let (mut c, _) = coordinator_with(config);

    for (ts, value) in [(0.0, 0.0), (0.2, 2.0), (0.1, 1.0), (0.3, 3.0), (0.4, 4.0)] {
        c.ingest(&[value], ts, false).unwrap();
    }
    assert_eq!(c.series().len(), 2);
    assert_eq!(c.pending_batches(), 3);

    c.stop_recording();
    let raw: Vec<f64> = c.series().rows().map(|r| r.raw).collect();
    assert_eq!(raw, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_reconnect_cycle() {
    let (mut c, clock) = coordinator_with(StreamConfig::default());
    c.on_connection_event(ConnectionEvent::Connected);

    c.start_calibration();
    c.ingest(&[1.0, 3.0], 0.0, false).unwrap();
    clock.set_time(10.0);
    let reference = c.end_calibration().and_then(|o| o.reference).unwrap();

    for i in 1..20 {
        c.ingest(&[1.0], i as f64 * 0.1 + 0.1, false).unwrap();
    }
    assert!(c.series().len() > 0);

    assert_eq!(c.on_connection_event(ConnectionEvent::Disconnected), ConnectionAction::Reconnect);
    assert_eq!(
        c.on_connection_event(ConnectionEvent::Connected),
        ConnectionAction::ResetPerformed
    );
    assert_eq!(c.series().len(), 0);
    assert_eq!(c.display().len(), 0);
    assert_eq!(c.reference(), reference);

    // late data from before the drop is refused
    assert!(matches!(c.ingest(&[1.0], 1.5, false), Err(IngestError::StaleBatch { .. })));

    clock.set_time(30.0);
    c.ingest(&[1.0], 10.0, false).unwrap();
    assert!(c.is_calibrating());
}

#[test]
fn test_export_after_recording() {
    let (mut c, clock) = coordinator_with(StreamConfig::default());
    c.ingest(&[1.0, 2.0, 3.0], 0.0, false).unwrap();
    clock.set_time(3.0);

    let text = c.stop_recording_and_export();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Recording Duration (s):,3.000000");
    assert_eq!(lines[1], "Maximum MVE:,0.000000");
    assert_eq!(lines.len(), 3 + 3);
    assert!(lines[4].starts_with("1,0.100000,2.000000"));
}
