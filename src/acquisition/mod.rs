// src/acquisition/mod.rs
//! Stream reconstruction: reordering, timestamp normalization, gap filling and buffering

pub mod gap_fill;
pub mod history;
pub mod normalizer;
pub mod ratio;
pub mod time_buffer;

pub use gap_fill::{hermite_fill, FillStrategy, GapDecision, GapFiller, GapPlan, GapTier};
pub use history::{BoundedSeries, ReconstructedSeries, SeriesRow};
pub use normalizer::TimestampNormalizer;
pub use ratio::{AcquisitionCounters, AcquisitionMonitor, HealthLevel, RatioSample};
pub use time_buffer::{PushOutcome, TimeBuffer};
