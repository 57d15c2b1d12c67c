// src/config/constants.rs
//! System-wide configuration constants

/// Sampling grid and timestamp handling constants
pub mod sampling {
    /// Nominal sensor rate is 10 Hz
    pub const DEFAULT_SAMPLE_PERIOD_S: f64 = 0.1;
    pub const DEFAULT_TIMESTAMP_PRECISION: u32 = 1;
    pub const MAX_TIMESTAMP_PRECISION: u32 = 9;
    pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;
    pub const DEFAULT_REORDER_WINDOW_S: f64 = 0.0;
    pub const DEFAULT_TIME_BUFFER_CAPACITY: usize = 500;

    /// Minimum spacing enforced between consecutive stored timestamps
    pub const MIN_TIMESTAMP_STEP_S: f64 = 0.002;
}

/// Gap detection and interpolation constants
pub mod gap_fill {
    pub const DEFAULT_SMALL_GAP_THRESHOLD_S: f64 = 0.1;
    pub const RECORD_GAP_CEILING_S: f64 = 3.0;
    pub const LINK_GAP_CEILING_S: f64 = 0.8;
    pub const LINK_REALIGN_THRESHOLD_S: f64 = 1.0;
    pub const DEFAULT_SMOOTH_MAX_SLOTS: usize = 10;

    /// Slot timestamps are snapped to this resolution to avoid float drift
    pub const SLOT_SNAP_RESOLUTION: f64 = 1e-9;
}

/// RMS window constants
pub mod rms {
    pub const DEFAULT_SHORT_WINDOW_SAMPLES: usize = 10;
    /// One second at the default 10 Hz rate
    pub const DEFAULT_ONE_SECOND_WINDOW_SAMPLES: usize = 10;
    pub const FULL_RESOLUTION_ONE_SECOND_WINDOW_SAMPLES: usize = 100;
    pub const LIVE_ONE_SECOND_WINDOW_SAMPLES: usize = 10;
    pub const LIVE_SHORT_WINDOW_SAMPLES: usize = 1;
    pub const DEFAULT_LONG_WINDOW_VALUES: usize = 10;
    pub const PERCENT_SCALE: f64 = 100.0;

    /// Accepted span of the one-second window, in seconds of samples
    pub const MIN_ONE_SECOND_SPAN_S: f64 = 0.5;
    pub const MAX_ONE_SECOND_SPAN_S: f64 = 2.0;
}

/// Calibration constants
pub mod calibration {
    pub const DEFAULT_DURATION_S: f64 = 10.0;
    pub const MIN_DURATION_S: f64 = 0.5;
    pub const MAX_DURATION_S: f64 = 120.0;
}

/// Bounded buffer constants
pub mod buffers {
    pub const DEFAULT_HIGH_WATER_MARK: usize = 6000;
    pub const DEFAULT_TRIM_TARGET: usize = 5000;
    pub const DEFAULT_DISPLAY_CAPACITY: usize = 1000;
    /// Display trimming keeps this percentage of the capacity
    pub const DISPLAY_TRIM_PERCENT: usize = 90;
    pub const DEFAULT_HISTORY_CAPACITY: usize = 500;
    pub const DEFAULT_MAX_RMS_HISTORY_CAPACITY: usize = 100;
    pub const DEFAULT_DROPPED_TIMESTAMP_CAPACITY: usize = 1000;
}

/// Acquisition ratio monitoring constants
pub mod acquisition {
    pub const DEFAULT_WINDOW_S: f64 = 1.0;
    pub const PERFECT_RATIO_PERCENT: f64 = 100.0;
    pub const LOW_RATIO_PERCENT: f64 = 10.0;
    pub const RECOVERING_RATIO_PERCENT: f64 = 80.0;
    pub const PERFECT_LOG_INTERVAL_S: f64 = 10.0;
    pub const NORMAL_LOG_INTERVAL_S: f64 = 1.0;

    /// Flat-signal detection
    pub const FLAT_SIGNAL_RUN: usize = 10;
    pub const FLAT_SIGNAL_EPSILON: f64 = 1e-4;
}

/// Transport-side constants
pub mod transport {
    pub const DEFAULT_PAYLOAD_SCALE: f64 = 1000.0;
    pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 2;
    pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 2] = [3000, 4000];
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
    pub const DEFAULT_STATS_INTERVAL_MS: u64 = 1000;
    pub const DEFAULT_STATS_HISTORY_CAPACITY: usize = 600;
}

/// File system paths
pub mod paths {
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/emg-stream/config.toml";
    pub const USER_CONFIG_DIR: &str = ".config/emg-stream";
    pub const LOCAL_CONFIG_FILE: &str = "emg-stream.toml";
    pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
    pub const ENV_PREFIX: &str = "EMG_STREAM__";
    pub const ENV_SEPARATOR: &str = "__";
}
