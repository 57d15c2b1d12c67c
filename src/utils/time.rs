// src/utils/time.rs
//! Injectable clocks for calibration and recording timing

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Clock trait for dependency injection and testing
///
/// Readings are seconds on an arbitrary but monotonic origin, the same axis the
/// transport uses when stamping batches.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

/// Monotonic clock measured from its construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Mock clock for deterministic testing
#[derive(Debug, Default)]
pub struct MockClock {
    current_bits: AtomicU64,
}

impl MockClock {
    pub fn new(initial_secs: f64) -> Self {
        Self {
            current_bits: AtomicU64::new(initial_secs.to_bits()),
        }
    }

    pub fn advance_by(&self, secs: f64) {
        let now = self.now_secs();
        self.set_time(now + secs);
    }

    pub fn set_time(&self, secs: f64) {
        self.current_bits.store(secs.to_bits(), Ordering::Relaxed);
    }
}

impl Clock for MockClock {
    fn now_secs(&self) -> f64 {
        f64::from_bits(self.current_bits.load(Ordering::Relaxed))
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_secs(&self) -> f64 {
        (**self).now_secs()
    }
}

/// Snap a timestamp to the given resolution to keep grid arithmetic from drifting
pub fn snap_to_resolution(value: f64, resolution: f64) -> f64 {
    if resolution <= 0.0 || !value.is_finite() {
        return value;
    }
    (value / resolution).round() * resolution
}
