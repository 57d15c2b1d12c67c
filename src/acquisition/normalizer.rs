// src/acquisition/normalizer.rs
//! Timestamp normalization: decimal grid rounding plus moving-average smoothing

use std::collections::VecDeque;

/// Rounds raw timestamps to a decimal grid and smooths them over the last N values
#[derive(Debug, Clone)]
pub struct TimestampNormalizer {
    scale: f64,
    window: VecDeque<f64>,
    window_size: usize,
}

impl TimestampNormalizer {
    /// Create new normalizer keeping `precision` decimals and averaging `window_size` values
    pub fn new(precision: u32, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            scale: 10f64.powi(precision as i32),
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Grid value for `raw`, without touching the smoothing window
    pub fn round(&self, raw: f64) -> f64 {
        (raw * self.scale).round() / self.scale
    }

    /// Round `raw`, push it into the window and return the window mean
    pub fn normalize(&mut self, raw: f64) -> f64 {
        let rounded = self.round(raw);
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(rounded);
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Move the smoothed clock to `timestamp`
    ///
    /// Every value in the window shifts by the same amount, so the mean lands on
    /// `timestamp` while the spacing of the window and its lag are preserved. An empty
    /// window is seeded with `timestamp`.
    pub fn reseed(&mut self, timestamp: f64) {
        if self.window.is_empty() {
            self.window.push_back(timestamp);
            return;
        }
        let mean = self.window.iter().sum::<f64>() / self.window.len() as f64;
        let shift = timestamp - mean;
        for value in self.window.iter_mut() {
            *value += shift;
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_tenth() {
        let normalizer = TimestampNormalizer::new(1, 10);
        assert!((normalizer.round(0.34) - 0.3).abs() < 1e-12);
        assert!((normalizer.round(1.234) - 1.2).abs() < 1e-12);
        assert!((normalizer.round(1.26) - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_moving_average_over_window() {
        let mut normalizer = TimestampNormalizer::new(1, 3);
        assert!((normalizer.normalize(1.0) - 1.0).abs() < 1e-12);
        assert!((normalizer.normalize(1.1) - 1.05).abs() < 1e-12);
        assert!((normalizer.normalize(1.2) - 1.1).abs() < 1e-12);
        // oldest value leaves the window
        assert!((normalizer.normalize(1.3) - 1.2).abs() < 1e-12);
        assert_eq!(normalizer.len(), 3);
    }

    #[test]
    fn test_jitter_is_smoothed() {
        let mut normalizer = TimestampNormalizer::new(1, 10);
        for i in 0..10 {
            normalizer.normalize(i as f64 * 0.1);
        }
        // a late arrival rounds to 1.2 but the mean moves far less
        let smoothed = normalizer.normalize(1.23);
        assert!(smoothed < 1.0);
    }

    #[test]
    fn test_reseed_shifts_window() {
        let mut normalizer = TimestampNormalizer::new(1, 4);
        for i in 0..4 {
            normalizer.normalize(i as f64 * 0.1);
        }
        // window 0.0..0.3, mean 0.15; jump so the mean sits at 3.05
        normalizer.reseed(3.05);
        assert_eq!(normalizer.len(), 4);
        // the next grid value continues the shifted run one step later
        assert!((normalizer.normalize(3.3) - 3.15).abs() < 1e-9);

        normalizer.reset();
        assert!(normalizer.is_empty());
        normalizer.reseed(7.0);
        assert!((normalizer.normalize(7.0) - 7.0).abs() < 1e-12);
    }
}
