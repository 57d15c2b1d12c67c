// src/coordinator/mod.rs
//! Ingest coordination: the owning coordinator, its async service, the transport pump
//! and dataset export

pub mod export;
pub mod ingest;
pub mod pump;
pub mod service;

pub use export::{export_dataset, COLUMN_HEADER};
pub use ingest::{IngestCoordinator, IngestReport, IngestStats, Snapshot};
pub use pump::{PumpExit, PumpStats, TransportPump};
pub use service::{IngestHandle, IngestService, ServiceTasks};
