//! Replay Demo
//!
//! Drives a simulated bursty link through the transport pump and ingest service,
//! runs a short calibration and prints the reconstructed dataset.
//!
//! Usage: cargo run --example replay [config.toml]

use emg_stream::config::{ConfigLoader, StreamConfig};
use emg_stream::coordinator::{IngestService, TransportPump};
use emg_stream::hal::{BurstyLinkSimulator, LinkClock, ReconnectPolicy, SimulatorConfig};
use emg_stream::utils::MonotonicClock;
use std::path::PathBuf;
use std::sync::Arc;

fn load_config() -> Result<StreamConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(ConfigLoader::with_paths(vec![PathBuf::from(path)]).load_stream_config()?),
        None => Ok(StreamConfig::default()),
    }
}

fn simulator_config(config: &StreamConfig, payloads: u64, disconnect_after: Option<u64>) -> SimulatorConfig {
    SimulatorConfig {
        sample_period_s: config.sampling.sample_period_s,
        payload_scale: config.transport.payload_scale,
        total_payloads: Some(payloads),
        disconnect_after,
        seed: Some(42),
        ..SimulatorConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("EMG-Stream Replay Demo");
    println!("======================");

    let mut config = load_config()?;
    // keep the demo short
    config.calibration.duration_s = 0.5;

    println!("Configuration:");
    println!("  Sample period: {} s", config.sampling.sample_period_s);
    println!("  Reorder window: {} s", config.sampling.reorder_window_s);
    println!("  Small gap threshold: {} s", config.gap_fill.small_gap_threshold_s);
    println!(
        "  Buffers: high water {} / trim target {}",
        config.buffers.high_water_mark, config.buffers.trim_target
    );
    println!();

    let (handle, tasks) = IngestService::spawn(config.clone(), Arc::new(MonotonicClock::new()))?;

    println!("Calibrating...");
    handle.start_calibration().await?;
    let calibration_feed = BurstyLinkSimulator::new(SimulatorConfig {
        realtime: true,
        ..simulator_config(&config, 60, None)
    })?;
    TransportPump::new(
        calibration_feed,
        handle.clone(),
        LinkClock::new(&config),
        ReconnectPolicy::new(&config.transport),
        config.transport.payload_scale,
    )
    .run(handle.cancellation_token())
    .await?;
    match handle.end_calibration().await? {
        Some(outcome) => println!(
            "  {} samples, reference {:.4}",
            outcome.samples,
            outcome.reference.unwrap_or(0.0)
        ),
        None => println!("  calibration already finished"),
    }

    println!("Recording from a lossy link with one disconnect...");
    handle.start_recording().await?;
    let feed = BurstyLinkSimulator::new(simulator_config(&config, 400, Some(250)))?;
    let stats = TransportPump::new(
        feed,
        handle.clone(),
        LinkClock::new(&config),
        ReconnectPolicy::new(&config.transport),
        config.transport.payload_scale,
    )
    .run(handle.cancellation_token())
    .await?;

    println!("Pump:");
    println!("  Payloads forwarded: {}", stats.payloads);
    println!("  Duplicates suppressed: {}", stats.duplicates_suppressed);
    println!("  Link fill samples: {}", stats.link_fill_samples);
    println!("  Reconnects: {}", stats.reconnects);
    println!("  Exit: {:?}", stats.exit);

    let ingest = handle.stats().await?;
    println!("Ingest:");
    println!("  Batches: {}", ingest.total_batches);
    println!("  Samples appended: {}", ingest.samples_appended);
    println!("  Interpolated samples: {}", ingest.interpolated_samples);
    println!("  Discontinuities: {}", ingest.discontinuities);
    println!("  Stale batches: {}", ingest.stale_batches);

    for sample in handle.ratio_history() {
        println!(
            "  Acquisition ratio at {:.1} s: {:.1}% ({:?})",
            sample.window_end_s, sample.ratio_percent, sample.level
        );
    }

    println!();
    println!("{}", handle.snapshot().await?.to_json()?);
    println!();
    println!("{}", handle.stop_recording_and_export().await?);

    handle.shutdown();
    tasks.join().await;
    Ok(())
}
