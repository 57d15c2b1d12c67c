// src/acquisition/ratio.rs
//! Acquisition ratio monitoring: received versus expected samples per window

use crate::config::constants::acquisition::*;
use crate::config::AcquisitionConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Shared counters written by the ingest coordinator and read by the monitor
#[derive(Debug, Default)]
pub struct AcquisitionCounters {
    received: AtomicU64,
    expected: AtomicU64,
    last_ratio_bits: AtomicU64,
}

impl AcquisitionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, count: u64) {
        self.received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_expected(&self, count: u64) {
        self.expected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn expected(&self) -> u64 {
        self.expected.load(Ordering::Relaxed)
    }

    /// Most recent ratio published by the monitor, in percent
    pub fn last_ratio_percent(&self) -> f64 {
        f64::from_bits(self.last_ratio_bits.load(Ordering::Relaxed))
    }

    pub fn publish_ratio(&self, percent: f64) {
        self.last_ratio_bits.store(percent.to_bits(), Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.expected.store(0, Ordering::Relaxed);
        self.last_ratio_bits.store(0f64.to_bits(), Ordering::Relaxed);
    }
}

/// Stream health derived from the acquisition ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthLevel {
    Perfect,
    Healthy,
    Recovering,
    Critical,
}

impl HealthLevel {
    pub fn from_ratio(percent: f64) -> Self {
        if percent >= PERFECT_RATIO_PERCENT {
            HealthLevel::Perfect
        } else if percent >= RECOVERING_RATIO_PERCENT {
            HealthLevel::Healthy
        } else if percent >= LOW_RATIO_PERCENT {
            HealthLevel::Recovering
        } else {
            HealthLevel::Critical
        }
    }
}

/// One evaluated window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioSample {
    pub window_end_s: f64,
    pub received: u64,
    pub expected: u64,
    pub ratio_percent: f64,
    pub level: HealthLevel,
}

/// Evaluates counter deltas once per window and throttles the resulting log lines
#[derive(Debug)]
pub struct AcquisitionMonitor {
    window_s: f64,
    window_start: Option<f64>,
    last_received: u64,
    last_expected: u64,
    last_level: Option<HealthLevel>,
    last_log_s: f64,
}

impl AcquisitionMonitor {
    /// Create new monitor evaluating every `window_s` seconds
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            window_s: config.window_s,
            window_start: None,
            last_received: 0,
            last_expected: 0,
            last_level: None,
            last_log_s: f64::NEG_INFINITY,
        }
    }

    /// Evaluate the window if it has elapsed at `now_s`
    pub fn evaluate(&mut self, counters: &AcquisitionCounters, now_s: f64) -> Option<RatioSample> {
        let start = *self.window_start.get_or_insert(now_s);
        if now_s - start < self.window_s {
            return None;
        }

        let received_total = counters.received();
        let expected_total = counters.expected();
        // counters were reset under us
        if received_total < self.last_received || expected_total < self.last_expected {
            self.last_received = 0;
            self.last_expected = 0;
        }
        let received = received_total - self.last_received;
        let expected = expected_total - self.last_expected;
        self.last_received = received_total;
        self.last_expected = expected_total;
        self.window_start = Some(now_s);

        if expected == 0 {
            return None;
        }

        let ratio_percent = (received as f64 / expected as f64 * 100.0).min(100.0);
        let level = HealthLevel::from_ratio(ratio_percent);
        counters.publish_ratio(ratio_percent);

        let sample = RatioSample {
            window_end_s: now_s,
            received,
            expected,
            ratio_percent,
            level,
        };
        self.log(&sample);
        Some(sample)
    }

    fn log(&mut self, sample: &RatioSample) {
        let changed = self.last_level != Some(sample.level);
        let since_last = sample.window_end_s - self.last_log_s;
        let ratio = sample.ratio_percent;

        let logged = match sample.level {
            HealthLevel::Perfect => {
                if changed || since_last >= PERFECT_LOG_INTERVAL_S {
                    info!(ratio, "acquisition ratio perfect");
                    true
                } else {
                    false
                }
            }
            HealthLevel::Critical => {
                warn!(ratio, received = sample.received, expected = sample.expected,
                      "acquisition ratio critically low, check connection");
                true
            }
            HealthLevel::Recovering => {
                info!(ratio, "acquisition ratio recovering");
                true
            }
            HealthLevel::Healthy => {
                if changed || since_last >= NORMAL_LOG_INTERVAL_S {
                    debug!(ratio, "acquisition ratio");
                    true
                } else {
                    false
                }
            }
        };

        if logged {
            self.last_log_s = sample.window_end_s;
        }
        self.last_level = Some(sample.level);
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.last_received = 0;
        self.last_expected = 0;
        self.last_level = None;
    }
}
