// src/config/mod.rs
//! Stream engine configuration

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete stream engine configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct StreamConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub gap_fill: GapFillConfig,
    #[serde(default)]
    pub rms: RmsConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Sampling grid, smoothing and reordering
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SamplingConfig {
    #[serde(default = "defaults::sample_period_s")]
    pub sample_period_s: f64,

    /// Decimal places kept when snapping timestamps to the grid
    #[serde(default = "defaults::timestamp_precision")]
    pub timestamp_precision: u32,

    #[serde(default = "defaults::smoothing_window")]
    pub smoothing_window: usize,

    /// Batches wait this long in the time buffer before release
    #[serde(default = "defaults::reorder_window_s")]
    pub reorder_window_s: f64,

    #[serde(default = "defaults::time_buffer_capacity")]
    pub time_buffer_capacity: usize,

    #[serde(default = "defaults::min_timestamp_step_s")]
    pub min_timestamp_step_s: f64,
}

/// Gap classification thresholds
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GapFillConfig {
    #[serde(default = "defaults::small_gap_threshold_s")]
    pub small_gap_threshold_s: f64,

    #[serde(default = "defaults::record_ceiling_s")]
    pub record_ceiling_s: f64,

    #[serde(default = "defaults::link_ceiling_s")]
    pub link_ceiling_s: f64,

    #[serde(default = "defaults::link_realign_threshold_s")]
    pub link_realign_threshold_s: f64,

    /// Gaps with fewer slots than this are smoothed, longer ones hold the last value
    #[serde(default = "defaults::smooth_max_slots")]
    pub smooth_max_slots: usize,
}

/// RMS window sizes, in samples (short, one-second) and in one-second values (long)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RmsConfig {
    #[serde(default = "defaults::short_window_samples")]
    pub short_window_samples: usize,

    #[serde(default = "defaults::one_second_window_samples")]
    pub one_second_window_samples: usize,

    #[serde(default = "defaults::long_window_values")]
    pub long_window_values: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    #[serde(default = "defaults::calibration_duration_s")]
    pub duration_s: f64,
}

/// Bounded buffer limits
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BufferConfig {
    #[serde(default = "defaults::high_water_mark")]
    pub high_water_mark: usize,

    #[serde(default = "defaults::trim_target")]
    pub trim_target: usize,

    #[serde(default = "defaults::display_capacity")]
    pub display_capacity: usize,

    #[serde(default = "defaults::history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "defaults::max_rms_history_capacity")]
    pub max_rms_history_capacity: usize,

    #[serde(default = "defaults::dropped_timestamp_capacity")]
    pub dropped_timestamp_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Start recording at the first sample of each session
    #[serde(default = "defaults::auto_start")]
    pub auto_start: bool,
}

/// Acquisition ratio and signal health monitoring
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    #[serde(default = "defaults::acquisition_window_s")]
    pub window_s: f64,

    #[serde(default = "defaults::flat_signal_run")]
    pub flat_signal_run: usize,

    #[serde(default = "defaults::flat_signal_epsilon")]
    pub flat_signal_epsilon: f64,
}

/// Transport adapter and service task settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TransportConfig {
    #[serde(default = "defaults::payload_scale")]
    pub payload_scale: f64,

    #[serde(default = "defaults::reconnect_attempts")]
    pub reconnect_attempts: u32,

    #[serde(default = "defaults::reconnect_delays_ms")]
    pub reconnect_delays_ms: Vec<u64>,

    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "defaults::tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "defaults::stats_interval_ms")]
    pub stats_interval_ms: u64,

    #[serde(default = "defaults::stats_history_capacity")]
    pub stats_history_capacity: usize,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;

    pub fn sample_period_s() -> f64 { sampling::DEFAULT_SAMPLE_PERIOD_S }
    pub fn timestamp_precision() -> u32 { sampling::DEFAULT_TIMESTAMP_PRECISION }
    pub fn smoothing_window() -> usize { sampling::DEFAULT_SMOOTHING_WINDOW }
    pub fn reorder_window_s() -> f64 { sampling::DEFAULT_REORDER_WINDOW_S }
    pub fn time_buffer_capacity() -> usize { sampling::DEFAULT_TIME_BUFFER_CAPACITY }
    pub fn min_timestamp_step_s() -> f64 { sampling::MIN_TIMESTAMP_STEP_S }

    pub fn small_gap_threshold_s() -> f64 { gap_fill::DEFAULT_SMALL_GAP_THRESHOLD_S }
    pub fn record_ceiling_s() -> f64 { gap_fill::RECORD_GAP_CEILING_S }
    pub fn link_ceiling_s() -> f64 { gap_fill::LINK_GAP_CEILING_S }
    pub fn link_realign_threshold_s() -> f64 { gap_fill::LINK_REALIGN_THRESHOLD_S }
    pub fn smooth_max_slots() -> usize { gap_fill::DEFAULT_SMOOTH_MAX_SLOTS }

    pub fn short_window_samples() -> usize { rms::DEFAULT_SHORT_WINDOW_SAMPLES }
    pub fn one_second_window_samples() -> usize { rms::DEFAULT_ONE_SECOND_WINDOW_SAMPLES }
    pub fn long_window_values() -> usize { rms::DEFAULT_LONG_WINDOW_VALUES }

    pub fn calibration_duration_s() -> f64 { calibration::DEFAULT_DURATION_S }

    pub fn high_water_mark() -> usize { buffers::DEFAULT_HIGH_WATER_MARK }
    pub fn trim_target() -> usize { buffers::DEFAULT_TRIM_TARGET }
    pub fn display_capacity() -> usize { buffers::DEFAULT_DISPLAY_CAPACITY }
    pub fn history_capacity() -> usize { buffers::DEFAULT_HISTORY_CAPACITY }
    pub fn max_rms_history_capacity() -> usize { buffers::DEFAULT_MAX_RMS_HISTORY_CAPACITY }
    pub fn dropped_timestamp_capacity() -> usize { buffers::DEFAULT_DROPPED_TIMESTAMP_CAPACITY }

    pub fn auto_start() -> bool { true }

    pub fn acquisition_window_s() -> f64 { acquisition::DEFAULT_WINDOW_S }
    pub fn flat_signal_run() -> usize { acquisition::FLAT_SIGNAL_RUN }
    pub fn flat_signal_epsilon() -> f64 { acquisition::FLAT_SIGNAL_EPSILON }

    pub fn payload_scale() -> f64 { transport::DEFAULT_PAYLOAD_SCALE }
    pub fn reconnect_attempts() -> u32 { transport::DEFAULT_RECONNECT_ATTEMPTS }
    pub fn reconnect_delays_ms() -> Vec<u64> { transport::DEFAULT_RECONNECT_DELAYS_MS.to_vec() }
    pub fn channel_capacity() -> usize { transport::DEFAULT_CHANNEL_CAPACITY }
    pub fn tick_interval_ms() -> u64 { transport::DEFAULT_TICK_INTERVAL_MS }
    pub fn stats_interval_ms() -> u64 { transport::DEFAULT_STATS_INTERVAL_MS }
    pub fn stats_history_capacity() -> usize { transport::DEFAULT_STATS_HISTORY_CAPACITY }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_period_s: defaults::sample_period_s(),
            timestamp_precision: defaults::timestamp_precision(),
            smoothing_window: defaults::smoothing_window(),
            reorder_window_s: defaults::reorder_window_s(),
            time_buffer_capacity: defaults::time_buffer_capacity(),
            min_timestamp_step_s: defaults::min_timestamp_step_s(),
        }
    }
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            small_gap_threshold_s: defaults::small_gap_threshold_s(),
            record_ceiling_s: defaults::record_ceiling_s(),
            link_ceiling_s: defaults::link_ceiling_s(),
            link_realign_threshold_s: defaults::link_realign_threshold_s(),
            smooth_max_slots: defaults::smooth_max_slots(),
        }
    }
}

/// Windows sized for the default 10 Hz sample period
impl Default for RmsConfig {
    fn default() -> Self {
        Self {
            short_window_samples: defaults::short_window_samples(),
            one_second_window_samples: defaults::one_second_window_samples(),
            long_window_values: defaults::long_window_values(),
        }
    }
}

impl RmsConfig {
    /// Full-resolution preset for a 100 Hz stream: 10-sample short window,
    /// 100-sample one-second window
    pub fn full_resolution() -> Self {
        Self {
            short_window_samples: rms::DEFAULT_SHORT_WINDOW_SAMPLES,
            one_second_window_samples: rms::FULL_RESOLUTION_ONE_SECOND_WINDOW_SAMPLES,
            long_window_values: rms::DEFAULT_LONG_WINDOW_VALUES,
        }
    }

    /// Live preset matching the 10 Hz display stream
    pub fn live() -> Self {
        Self {
            short_window_samples: rms::LIVE_SHORT_WINDOW_SAMPLES,
            one_second_window_samples: rms::LIVE_ONE_SECOND_WINDOW_SAMPLES,
            long_window_values: rms::DEFAULT_LONG_WINDOW_VALUES,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            duration_s: defaults::calibration_duration_s(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            high_water_mark: defaults::high_water_mark(),
            trim_target: defaults::trim_target(),
            display_capacity: defaults::display_capacity(),
            history_capacity: defaults::history_capacity(),
            max_rms_history_capacity: defaults::max_rms_history_capacity(),
            dropped_timestamp_capacity: defaults::dropped_timestamp_capacity(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            auto_start: defaults::auto_start(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            window_s: defaults::acquisition_window_s(),
            flat_signal_run: defaults::flat_signal_run(),
            flat_signal_epsilon: defaults::flat_signal_epsilon(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            payload_scale: defaults::payload_scale(),
            reconnect_attempts: defaults::reconnect_attempts(),
            reconnect_delays_ms: defaults::reconnect_delays_ms(),
            channel_capacity: defaults::channel_capacity(),
            tick_interval_ms: defaults::tick_interval_ms(),
            stats_interval_ms: defaults::stats_interval_ms(),
            stats_history_capacity: defaults::stats_history_capacity(),
        }
    }
}

impl TransportConfig {
    /// Delay before the given zero-based reconnect attempt; the last delay repeats
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.reconnect_delays_ms.len().saturating_sub(1));
        Duration::from_millis(self.reconnect_delays_ms.get(idx).copied().unwrap_or(0))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Configuration utility functions
impl StreamConfig {
    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let s = &self.sampling;
        if !(s.sample_period_s.is_finite() && s.sample_period_s > 0.0) {
            errors.push(format!("sample_period_s must be positive, got {}", s.sample_period_s));
        }
        if s.timestamp_precision > sampling::MAX_TIMESTAMP_PRECISION {
            errors.push(format!(
                "timestamp_precision ({}) exceeds maximum of {}",
                s.timestamp_precision,
                sampling::MAX_TIMESTAMP_PRECISION
            ));
        }
        if s.smoothing_window == 0 {
            errors.push("smoothing_window must be at least 1".to_string());
        }
        if s.time_buffer_capacity == 0 {
            errors.push("time_buffer_capacity must be at least 1".to_string());
        }
        if !(s.reorder_window_s >= 0.0) {
            errors.push(format!("reorder_window_s must be non-negative, got {}", s.reorder_window_s));
        }
        if !(s.min_timestamp_step_s > 0.0 && s.min_timestamp_step_s < s.sample_period_s) {
            errors.push(format!(
                "min_timestamp_step_s ({}) must be positive and below sample_period_s ({})",
                s.min_timestamp_step_s, s.sample_period_s
            ));
        }

        let g = &self.gap_fill;
        if !(g.small_gap_threshold_s >= 0.0) {
            errors.push("small_gap_threshold_s must be non-negative".to_string());
        }
        if g.record_ceiling_s <= g.small_gap_threshold_s {
            errors.push(format!(
                "record_ceiling_s ({}) must exceed small_gap_threshold_s ({})",
                g.record_ceiling_s, g.small_gap_threshold_s
            ));
        }
        if g.link_ceiling_s <= g.small_gap_threshold_s {
            errors.push(format!(
                "link_ceiling_s ({}) must exceed small_gap_threshold_s ({})",
                g.link_ceiling_s, g.small_gap_threshold_s
            ));
        }

        let r = &self.rms;
        if r.short_window_samples == 0 || r.one_second_window_samples == 0 || r.long_window_values == 0 {
            errors.push("RMS window sizes must be at least 1".to_string());
        }
        let span = r.one_second_window_samples as f64 * s.sample_period_s;
        if r.one_second_window_samples > 0
            && !(rms::MIN_ONE_SECOND_SPAN_S..=rms::MAX_ONE_SECOND_SPAN_S).contains(&span)
        {
            errors.push(format!(
                "one_second_window_samples ({}) spans {:.2} s at sample_period_s {}, expected about 1 s",
                r.one_second_window_samples, span, s.sample_period_s
            ));
        }

        let c = &self.calibration;
        if !(calibration::MIN_DURATION_S..=calibration::MAX_DURATION_S).contains(&c.duration_s) {
            errors.push(format!(
                "calibration duration ({} s) outside {}..={} s",
                c.duration_s,
                calibration::MIN_DURATION_S,
                calibration::MAX_DURATION_S
            ));
        }

        let b = &self.buffers;
        if b.trim_target == 0 || b.trim_target >= b.high_water_mark {
            errors.push(format!(
                "trim_target ({}) must be positive and below high_water_mark ({})",
                b.trim_target, b.high_water_mark
            ));
        }
        if b.display_capacity == 0 || b.history_capacity == 0 || b.max_rms_history_capacity == 0 {
            errors.push("display and history capacities must be at least 1".to_string());
        }

        if !(self.acquisition.window_s > 0.0) {
            errors.push("acquisition window_s must be positive".to_string());
        }

        let t = &self.transport;
        if !(t.payload_scale > 0.0) {
            errors.push("payload_scale must be positive".to_string());
        }
        if t.reconnect_attempts > 0 && t.reconnect_delays_ms.is_empty() {
            errors.push("reconnect_delays_ms must not be empty when reconnect_attempts > 0".to_string());
        }
        if t.channel_capacity == 0 {
            errors.push("channel_capacity must be at least 1".to_string());
        }
        if t.tick_interval_ms == 0 || t.stats_interval_ms == 0 {
            errors.push("tick and stats intervals must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get configuration summary
    pub fn get_summary(&self) -> ConfigSummary {
        ConfigSummary {
            sample_rate_hz: 1.0 / self.sampling.sample_period_s,
            one_second_window_samples: self.rms.one_second_window_samples,
            calibration_duration_s: self.calibration.duration_s,
            high_water_mark: self.buffers.high_water_mark,
            reorder_window_s: self.sampling.reorder_window_s,
        }
    }
}

/// Configuration summary for display/logging
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub sample_rate_hz: f64,
    pub one_second_window_samples: usize,
    pub calibration_duration_s: f64,
    pub high_water_mark: usize,
    pub reorder_window_s: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = StreamConfig::default();
        assert_eq!(config.sampling.sample_period_s, sampling::DEFAULT_SAMPLE_PERIOD_S);
        assert_eq!(config.buffers.high_water_mark, 6000);
        assert_eq!(config.buffers.trim_target, 5000);
        assert_eq!(config.transport.reconnect_delays_ms, vec![3000, 4000]);
        assert!(config.validate_consistency().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = StreamConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: StreamConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: StreamConfig = toml::from_str(
            r#"
            [rms]
            one_second_window_samples = 10

            [calibration]
            duration_s = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.rms.one_second_window_samples, 10);
        assert_eq!(config.rms.short_window_samples, rms::DEFAULT_SHORT_WINDOW_SAMPLES);
        assert_eq!(config.calibration.duration_s, 5.0);
        assert_eq!(config.gap_fill, GapFillConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = StreamConfig::default();
        config.buffers.trim_target = config.buffers.high_water_mark;
        config.calibration.duration_s = 0.0;

        let errors = config.validate_consistency().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_rms_presets() {
        assert_eq!(RmsConfig::full_resolution().one_second_window_samples, 100);
        assert_eq!(RmsConfig::live().one_second_window_samples, 10);
        assert_eq!(RmsConfig::default().one_second_window_samples, 10);
    }

    #[test]
    fn test_one_second_window_must_span_about_a_second() {
        let mut config = StreamConfig::default();
        assert!(config.validate_consistency().is_ok());

        config.rms = RmsConfig::full_resolution();
        let errors = config.validate_consistency().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("one_second_window_samples"));

        config.sampling.sample_period_s = 0.01;
        config.sampling.min_timestamp_step_s = 0.002;
        assert!(config.validate_consistency().is_ok());
    }

    #[test]
    fn test_reconnect_delay_repeats_last() {
        let transport = TransportConfig::default();
        assert_eq!(transport.reconnect_delay(0), Duration::from_secs(3));
        assert_eq!(transport.reconnect_delay(1), Duration::from_secs(4));
        assert_eq!(transport.reconnect_delay(5), Duration::from_secs(4));
    }
}
