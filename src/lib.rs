//! emg-stream: streaming reconstruction and windowed statistics for bursty EMG feeds
//!
//! Samples arrive over an unreliable wireless link: notifications jitter, get lost,
//! get delivered twice or arrive in bursts. This crate turns that feed into a
//! uniformly spaced, strictly increasing series and maintains windowed RMS statistics
//! relative to a calibrated maximum reference.
//!
//! - Priority-ordered reorder buffer with duplicate suppression
//! - Timestamp normalization and gap filling (smooth, hold or skip)
//! - Short, one-second and sliding-max RMS windows
//! - Calibration of the maximum voluntary effort reference
//! - Bounded, index-aligned history buffers and dataset export
//! - Async service with a transport pump and reconnect policy
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emg_stream::config::StreamConfig;
//! use emg_stream::coordinator::{IngestService, TransportPump};
//! use emg_stream::hal::{BurstyLinkSimulator, LinkClock, ReconnectPolicy, SimulatorConfig};
//! use emg_stream::utils::MonotonicClock;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamConfig::default();
//!     let (handle, tasks) = IngestService::spawn(config.clone(), Arc::new(MonotonicClock::new()))?;
//!
//!     let simulator = BurstyLinkSimulator::new(SimulatorConfig {
//!         total_payloads: Some(300),
//!         ..SimulatorConfig::default()
//!     })?;
//!     let pump = TransportPump::new(
//!         simulator,
//!         handle.clone(),
//!         LinkClock::new(&config),
//!         ReconnectPolicy::new(&config.transport),
//!         config.transport.payload_scale,
//!     );
//!     pump.run(handle.cancellation_token()).await?;
//!
//!     println!("{}", handle.stop_recording_and_export().await?);
//!     handle.shutdown();
//!     tasks.join().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod acquisition;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hal;
pub mod processing;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{ConfigLoader, StreamConfig};
pub use coordinator::{IngestCoordinator, IngestHandle, IngestReport, IngestService, Snapshot};
pub use error::{EmgError, EmgResult, IngestError};
pub use hal::{ConnectionAction, ConnectionEvent, Sample, TimestampedBatch};
pub use utils::{Clock, MockClock, MonotonicClock};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Streaming reconstruction and windowed statistics for EMG feeds".to_string(),
        features: vec![
            "Reorder buffer with duplicate suppression".to_string(),
            "Gap detection and interpolation".to_string(),
            "Windowed RMS and calibration".to_string(),
            "Async ingest service".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
