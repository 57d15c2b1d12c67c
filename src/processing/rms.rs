// src/processing/rms.rs
//! Multi-window RMS aggregation

use crate::config::constants::rms::PERCENT_SCALE;
use crate::config::RmsConfig;
use std::collections::VecDeque;

/// Root mean square over the finite values of `samples`; 0.0 when none are finite
pub fn calculate_rms(samples: &[f64]) -> f64 {
    let (sum_sq, count) = samples
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, n), &v| (sum + v * v, n + 1));
    if count == 0 {
        0.0
    } else {
        (sum_sq / count as f64).sqrt()
    }
}

/// RMS as a percentage of `reference`; 0.0 without a positive reference
pub fn percent_of_reference(rms: f64, reference: f64) -> f64 {
    if reference > 0.0 && rms.is_finite() {
        rms / reference * PERCENT_SCALE
    } else {
        0.0
    }
}

/// Values emitted by one push or flush
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RmsUpdate {
    /// Short tumbling window completed
    pub short: Option<f64>,
    /// One-second tumbling window completed
    pub one_second: Option<f64>,
    /// Sliding max over the last K one-second values, when `one_second` is set
    pub long_max: Option<f64>,
}

impl RmsUpdate {
    pub fn is_empty(&self) -> bool {
        self.short.is_none() && self.one_second.is_none()
    }
}

/// Short and one-second tumbling windows plus a sliding max over one-second values
#[derive(Debug, Clone)]
pub struct RmsAggregator {
    config: RmsConfig,
    short_window: Vec<f64>,
    one_second_window: Vec<f64>,
    long_values: VecDeque<f64>,
    latest_short: f64,
    latest_one_second: f64,
    long_max: f64,
    windows_completed: u64,
}

impl RmsAggregator {
    /// Create new aggregator with the given window sizes
    pub fn new(config: RmsConfig) -> Self {
        let config = RmsConfig {
            short_window_samples: config.short_window_samples.max(1),
            one_second_window_samples: config.one_second_window_samples.max(1),
            long_window_values: config.long_window_values.max(1),
        };
        Self {
            short_window: Vec::with_capacity(config.short_window_samples),
            one_second_window: Vec::with_capacity(config.one_second_window_samples),
            long_values: VecDeque::with_capacity(config.long_window_values),
            config,
            latest_short: 0.0,
            latest_one_second: 0.0,
            long_max: 0.0,
            windows_completed: 0,
        }
    }

    pub fn config(&self) -> &RmsConfig {
        &self.config
    }

    /// Add one sample, emitting RMS for every window it completes
    pub fn push(&mut self, value: f64) -> RmsUpdate {
        self.short_window.push(value);
        self.one_second_window.push(value);

        let mut update = RmsUpdate::default();
        if self.short_window.len() >= self.config.short_window_samples {
            update.short = Some(self.close_short());
        }
        if self.one_second_window.len() >= self.config.one_second_window_samples {
            let (rms, max) = self.close_one_second();
            update.one_second = Some(rms);
            update.long_max = Some(max);
        }
        update
    }

    /// Close partial windows, emitting RMS for any that hold samples
    pub fn flush(&mut self) -> RmsUpdate {
        let mut update = RmsUpdate::default();
        if !self.short_window.is_empty() {
            update.short = Some(self.close_short());
        }
        if !self.one_second_window.is_empty() {
            let (rms, max) = self.close_one_second();
            update.one_second = Some(rms);
            update.long_max = Some(max);
        }
        update
    }

    fn close_short(&mut self) -> f64 {
        let rms = calculate_rms(&self.short_window);
        self.short_window.clear();
        self.latest_short = rms;
        rms
    }

    fn close_one_second(&mut self) -> (f64, f64) {
        let rms = calculate_rms(&self.one_second_window);
        self.one_second_window.clear();
        self.latest_one_second = rms;

        if self.long_values.len() == self.config.long_window_values {
            self.long_values.pop_front();
        }
        self.long_values.push_back(rms);
        self.long_max = self.long_values.iter().copied().fold(0.0, f64::max);
        self.windows_completed += 1;
        (rms, self.long_max)
    }

    pub fn latest_short(&self) -> f64 {
        self.latest_short
    }

    pub fn latest_one_second(&self) -> f64 {
        self.latest_one_second
    }

    pub fn long_max(&self) -> f64 {
        self.long_max
    }

    /// One-second windows closed since the last reset
    pub fn windows_completed(&self) -> u64 {
        self.windows_completed
    }

    pub fn pending_samples(&self) -> usize {
        self.one_second_window.len()
    }

    pub fn reset(&mut self) {
        self.short_window.clear();
        self.one_second_window.clear();
        self.long_values.clear();
        self.latest_short = 0.0;
        self.latest_one_second = 0.0;
        self.long_max = 0.0;
        self.windows_completed = 0;
    }
}
