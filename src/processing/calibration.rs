// src/processing/calibration.rs
//! Calibration of the maximum voluntary effort reference

use crate::config::{CalibrationConfig, RmsConfig};
use crate::processing::rms::RmsAggregator;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Calibration state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CalibrationState {
    Idle,
    Calibrating { started_at: f64 },
}

/// Summary of a finished calibration cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    /// New reference, or `None` when the cycle saw no samples and the old one was kept
    pub reference: Option<f64>,
    pub samples: usize,
    pub observed_peak: f64,
    pub duration_s: f64,
}

/// Idle -> Calibrating -> Idle controller owning the frozen reference value
#[derive(Debug, Clone)]
pub struct CalibrationController {
    duration_s: f64,
    state: CalibrationState,
    observed_peak: f64,
    sample_buffer: Vec<f64>,
    peak_history: Vec<f64>,
    rms: RmsAggregator,
    one_second_max: f64,
    reference: f64,
    force_recalibration: bool,
    completed_cycles: u64,
}

impl CalibrationController {
    /// Create new idle controller with no reference
    pub fn new(config: &CalibrationConfig, rms: RmsConfig) -> Self {
        Self {
            duration_s: config.duration_s,
            state: CalibrationState::Idle,
            observed_peak: 0.0,
            sample_buffer: Vec::new(),
            peak_history: Vec::new(),
            rms: RmsAggregator::new(rms),
            one_second_max: 0.0,
            reference: 0.0,
            force_recalibration: false,
            completed_cycles: 0,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrating { .. })
    }

    /// Frozen reference; 0.0 until the first successful calibration
    pub fn reference(&self) -> f64 {
        self.reference
    }

    pub fn observed_peak(&self) -> f64 {
        self.observed_peak
    }

    pub fn peak_history(&self) -> &[f64] {
        &self.peak_history
    }

    pub fn sample_count(&self) -> usize {
        self.sample_buffer.len()
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    /// Begin a cycle, discarding anything gathered by a previous one
    pub fn start(&mut self, now_s: f64) {
        if self.is_active() {
            warn!("calibration restarted while already active");
        }
        self.sample_buffer.clear();
        self.peak_history.clear();
        self.observed_peak = 0.0;
        self.one_second_max = 0.0;
        self.rms.reset();
        self.force_recalibration = false;
        self.state = CalibrationState::Calibrating { started_at: now_s };
        info!(duration_s = self.duration_s, "calibration started");
    }

    /// Feed a batch into the active cycle. Ignored while idle.
    pub fn record(&mut self, values: &[f64]) {
        if !self.is_active() || values.is_empty() {
            return;
        }
        let batch_max = values.iter().copied().filter(|v| v.is_finite()).fold(f64::NEG_INFINITY, f64::max);
        if batch_max.is_finite() {
            self.observed_peak = self.observed_peak.max(batch_max);
            self.peak_history.push(batch_max);
        }
        for &value in values {
            self.sample_buffer.push(value);
            if let Some(rms) = self.rms.push(value).one_second {
                self.one_second_max = self.one_second_max.max(rms);
            }
        }
    }

    /// Whether the fixed duration has elapsed at `now_s`
    pub fn is_due(&self, now_s: f64) -> bool {
        match self.state {
            CalibrationState::Calibrating { started_at } => now_s - started_at >= self.duration_s,
            CalibrationState::Idle => false,
        }
    }

    /// Finish the cycle and freeze the reference. Returns `None` when idle.
    pub fn end(&mut self, now_s: f64) -> Option<CalibrationOutcome> {
        let CalibrationState::Calibrating { started_at } = self.state else {
            return None;
        };
        self.state = CalibrationState::Idle;

        if let Some(rms) = self.rms.flush().one_second {
            self.one_second_max = self.one_second_max.max(rms);
        }

        let samples = self.sample_buffer.len();
        let reference = if samples == 0 {
            warn!(previous = self.reference, "calibration collected no samples, keeping previous reference");
            None
        } else {
            self.reference = self.one_second_max;
            self.completed_cycles += 1;
            info!(reference = self.reference, peak = self.observed_peak, samples, "calibration complete");
            Some(self.reference)
        };
        self.sample_buffer.clear();

        Some(CalibrationOutcome {
            reference,
            samples,
            observed_peak: self.observed_peak,
            duration_s: now_s - started_at,
        })
    }

    /// Arm a calibration for the next stream start
    pub fn request_recalibration(&mut self) {
        self.force_recalibration = true;
    }

    pub fn recalibration_pending(&self) -> bool {
        self.force_recalibration
    }

    /// Start a cycle if one was requested. Returns whether it started.
    pub fn start_if_requested(&mut self, now_s: f64) -> bool {
        if self.force_recalibration && !self.is_active() {
            info!("forced recalibration");
            self.start(now_s);
            return true;
        }
        false
    }

    /// Abandon a cycle in progress without touching the reference
    pub fn abort(&mut self) {
        if self.is_active() {
            warn!(samples = self.sample_buffer.len(), "calibration aborted");
        }
        self.state = CalibrationState::Idle;
        self.sample_buffer.clear();
        self.rms.reset();
        self.one_second_max = 0.0;
    }

    /// Drop the reference and any cycle in progress
    pub fn reset(&mut self) {
        self.state = CalibrationState::Idle;
        self.sample_buffer.clear();
        self.peak_history.clear();
        self.observed_peak = 0.0;
        self.one_second_max = 0.0;
        self.rms.reset();
        self.reference = 0.0;
        self.force_recalibration = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> CalibrationController {
        CalibrationController::new(
            &CalibrationConfig { duration_s: 10.0 },
            RmsConfig {
                short_window_samples: 2,
                one_second_window_samples: 4,
                long_window_values: 10,
            },
        )
    }

    #[test]
    fn test_reference_is_max_one_second_rms() {
        let mut cal = controller();
        cal.start(0.0);
        cal.record(&[1.0, 1.0, 1.0, 1.0]);
        cal.record(&[3.0, 4.0, 3.0, 4.0]);
        cal.record(&[2.0]);
        let outcome = cal.end(5.0).unwrap();

        assert!((outcome.reference.unwrap() - 3.5355339).abs() < 1e-6);
        assert_eq!(outcome.samples, 9);
        assert_eq!(outcome.observed_peak, 4.0);
        assert_eq!(outcome.duration_s, 5.0);
        assert_eq!(cal.peak_history(), &[1.0, 4.0, 2.0]);
        assert!(!cal.is_active());
    }

    #[test]
    fn test_partial_final_window_counts() {
        let mut cal = controller();
        cal.start(0.0);
        cal.record(&[1.0, 1.0, 1.0, 1.0, 9.0]);
        let outcome = cal.end(1.0).unwrap();
        assert_eq!(outcome.reference, Some(9.0));
    }

    #[test]
    fn test_peak_is_monotonic_while_active() {
        let mut cal = controller();
        cal.start(0.0);
        let mut last = 0.0;
        for batch in [[0.5], [2.0], [1.0], [3.0], [0.1]] {
            cal.record(&batch);
            assert!(cal.observed_peak() >= last);
            last = cal.observed_peak();
        }
        assert_eq!(last, 3.0);
    }

    #[test]
    fn test_reference_frozen_outside_calibration() {
        let mut cal = controller();
        cal.start(0.0);
        cal.record(&[2.0, 2.0, 2.0, 2.0]);
        cal.end(10.0);
        let frozen = cal.reference();

        cal.record(&[100.0, 100.0, 100.0, 100.0]);
        assert_eq!(cal.reference(), frozen);
        assert_eq!(cal.sample_count(), 0);
    }

    #[test]
    fn test_empty_calibration_keeps_previous_reference() {
        let mut cal = controller();
        cal.start(0.0);
        cal.record(&[2.0, 2.0, 2.0, 2.0]);
        cal.end(10.0);

        cal.start(20.0);
        let outcome = cal.end(30.0).unwrap();
        assert_eq!(outcome.reference, None);
        assert_eq!(cal.reference(), 2.0);
    }

    #[test]
    fn test_auto_end_after_duration() {
        let mut cal = controller();
        cal.start(1.0);
        assert!(!cal.is_due(10.9));
        assert!(cal.is_due(11.0));
        assert!(cal.end(11.0).is_some());
        assert!(cal.end(12.0).is_none());
    }

    #[test]
    fn test_forced_recalibration() {
        let mut cal = controller();
        assert!(!cal.start_if_requested(0.0));
        cal.request_recalibration();
        assert!(cal.recalibration_pending());
        assert!(cal.start_if_requested(0.0));
        assert!(cal.is_active());
        assert!(!cal.recalibration_pending());
    }
}
