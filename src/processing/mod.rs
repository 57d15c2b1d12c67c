// src/processing/mod.rs
//! Windowed statistics and calibration

pub mod calibration;
pub mod rms;

pub use calibration::{CalibrationController, CalibrationOutcome, CalibrationState};
pub use rms::{calculate_rms, percent_of_reference, RmsAggregator, RmsUpdate};
