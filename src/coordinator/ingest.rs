// src/coordinator/ingest.rs
//! The ingest coordinator: single owner of every buffer in the reconstruction pipeline
//!
//! Batches flow through the time buffer in timestamp order, are routed to calibration
//! or to the gap filler, and land in the display series and, while recording, in the
//! index-aligned reconstructed series together with their RMS statistics.

use crate::acquisition::gap_fill::{GapDecision, GapFiller, GapTier};
use crate::acquisition::history::{BoundedSeries, ReconstructedSeries, SeriesRow};
use crate::acquisition::normalizer::TimestampNormalizer;
use crate::acquisition::ratio::AcquisitionCounters;
use crate::acquisition::time_buffer::{PushOutcome, TimeBuffer};
use crate::config::constants::buffers::DISPLAY_TRIM_PERCENT;
use crate::config::StreamConfig;
use crate::coordinator::export;
use crate::error::{ConfigError, EmgResult, IngestError, IntoEmgError};
use crate::hal::types::{ConnectionAction, ConnectionEvent, Sample, TimestampedBatch};
use crate::processing::calibration::{CalibrationController, CalibrationOutcome};
use crate::processing::rms::{percent_of_reference, RmsAggregator};
use crate::utils::time::Clock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a single `ingest` call did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Batches released from the time buffer and processed
    pub batches_released: usize,
    pub samples_appended: usize,
    pub interpolated_inserted: usize,
    pub discontinuities: usize,
    /// Rows dropped from the reconstructed series by trimming
    pub trimmed: usize,
    /// Set when this call ended a calibration cycle
    pub calibration: Option<CalibrationOutcome>,
}

/// Packet statistics accumulated since construction or the last full reset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    pub total_batches: u64,
    pub empty_batches: u64,
    pub non_finite_timestamps: u64,
    pub stale_batches: u64,
    pub duplicates: u64,
    pub sanitized_values: u64,
    pub discontinuities: u64,
    pub interpolated_samples: u64,
    pub samples_appended: u64,
    pub overflow_releases: u64,
    pub trimmed_rows: u64,
    pub alignment_repairs: u64,
}

/// Point-in-time view handed to observers
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub display: Vec<Sample>,
    pub one_second_rms: Vec<f64>,
    pub percent_reference: Vec<f64>,
    pub max_rms: Vec<f64>,
    pub reference: f64,
    pub acquisition_ratio_percent: f64,
    pub calibrating: bool,
    pub recording: bool,
    pub series_len: usize,
    pub stats: IngestStats,
}

impl Snapshot {
    pub fn to_json(&self) -> EmgResult<String> {
        serde_json::to_string(self).emg_err("coordinator", "snapshot_to_json")
    }
}

#[derive(Debug, Clone, Default)]
struct RecordingState {
    active: bool,
    started_at: f64,
    last_duration_s: f64,
    auto_started: bool,
    explicitly_stopped: bool,
}

#[derive(Debug, Clone, Default)]
struct ConnectionState {
    connected: bool,
    had_disconnect: bool,
}

/// Owns and mutates every buffer and counter of the stream
pub struct IngestCoordinator {
    config: StreamConfig,
    clock: Arc<dyn Clock>,
    period: f64,

    time_buffer: TimeBuffer,
    normalizer: TimestampNormalizer,
    gap_filler: GapFiller,
    rms: RmsAggregator,
    calibration: CalibrationController,

    series: ReconstructedSeries,
    display: BoundedSeries<Sample>,
    one_second_history: BoundedSeries<f64>,
    percent_history: BoundedSeries<f64>,
    max_rms_history: BoundedSeries<f64>,
    dropped_timestamps: BoundedSeries<f64>,
    recent_raw: BoundedSeries<f64>,
    flat_warned: bool,

    counters: Arc<AcquisitionCounters>,
    stats: IngestStats,

    last_timestamp: Option<f64>,
    last_value: f64,
    /// Raw grid position minus stored timestamp; slots are shifted by it
    frame_lag: f64,
    newest_batch: Option<f64>,
    reset_boundary: Option<f64>,

    recording: RecordingState,
    connection: ConnectionState,
    session_started: bool,
}

impl IngestCoordinator {
    /// Create new coordinator after validating `config`
    pub fn new(config: StreamConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate_consistency().map_err(ConfigError::Validation)?;

        let s = &config.sampling;
        let b = &config.buffers;
        let display_keep = b.display_capacity * DISPLAY_TRIM_PERCENT / 100;

        Ok(Self {
            period: s.sample_period_s,
            time_buffer: TimeBuffer::new(s.time_buffer_capacity),
            normalizer: TimestampNormalizer::new(s.timestamp_precision, s.smoothing_window),
            gap_filler: GapFiller::new(config.gap_fill.clone(), s.sample_period_s),
            rms: RmsAggregator::new(config.rms.clone()),
            calibration: CalibrationController::new(&config.calibration, config.rms.clone()),
            series: ReconstructedSeries::new(b.high_water_mark, b.trim_target),
            display: BoundedSeries::with_trim(b.display_capacity, display_keep),
            one_second_history: BoundedSeries::new(b.history_capacity),
            percent_history: BoundedSeries::new(b.history_capacity),
            max_rms_history: BoundedSeries::new(b.max_rms_history_capacity),
            dropped_timestamps: BoundedSeries::new(b.dropped_timestamp_capacity),
            recent_raw: BoundedSeries::new(config.acquisition.flat_signal_run.max(1)),
            flat_warned: false,
            counters: Arc::new(AcquisitionCounters::new()),
            stats: IngestStats::default(),
            last_timestamp: None,
            last_value: 0.0,
            frame_lag: 0.0,
            newest_batch: None,
            reset_boundary: None,
            recording: RecordingState::default(),
            connection: ConnectionState::default(),
            session_started: false,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Shared counters read by the statistics task
    pub fn counters(&self) -> Arc<AcquisitionCounters> {
        Arc::clone(&self.counters)
    }

    pub fn stats(&self) -> IngestStats {
        let mut stats = self.stats.clone();
        stats.alignment_repairs = self.series.repairs();
        stats
    }

    pub fn series(&self) -> &ReconstructedSeries {
        &self.series
    }

    pub fn display(&self) -> &BoundedSeries<Sample> {
        &self.display
    }

    pub fn one_second_history(&self) -> &BoundedSeries<f64> {
        &self.one_second_history
    }

    pub fn percent_history(&self) -> &BoundedSeries<f64> {
        &self.percent_history
    }

    pub fn max_rms_history(&self) -> &BoundedSeries<f64> {
        &self.max_rms_history
    }

    /// Timestamps of synthesized slots and sanitized values
    pub fn dropped_timestamps(&self) -> &BoundedSeries<f64> {
        &self.dropped_timestamps
    }

    pub fn reference(&self) -> f64 {
        self.calibration.reference()
    }

    pub fn calibration(&self) -> &CalibrationController {
        &self.calibration
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_active()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.active
    }

    /// Timestamp the next real sample is expected at
    pub fn expected_anchor(&self) -> Option<f64> {
        self.gap_filler.expected_next()
    }

    /// Batches older than this are refused
    pub fn reset_boundary(&self) -> Option<f64> {
        self.reset_boundary
    }

    /// Batches waiting in the reorder buffer
    pub fn pending_batches(&self) -> usize {
        self.time_buffer.len()
    }

    /// Feed one batch of values sharing `timestamp`
    ///
    /// A rejected batch leaves every buffer untouched; only the packet statistics
    /// record the rejection.
    pub fn ingest(
        &mut self,
        values: &[f64],
        timestamp: f64,
        is_interpolated: bool,
    ) -> Result<IngestReport, IngestError> {
        self.stats.total_batches += 1;

        if values.is_empty() {
            self.stats.empty_batches += 1;
            warn!(timestamp, "empty batch skipped");
            return Err(IngestError::EmptyBatch);
        }
        if !timestamp.is_finite() {
            self.stats.non_finite_timestamps += 1;
            warn!(timestamp, len = values.len(), "batch with non-finite timestamp skipped");
            return Err(IngestError::NonFiniteTimestamp(timestamp));
        }
        if let Some(boundary) = self.reset_boundary {
            if timestamp <= boundary {
                self.stats.stale_batches += 1;
                debug!(timestamp, boundary, "batch predates reset boundary");
                return Err(IngestError::StaleBatch { timestamp, boundary });
            }
        }

        let sanitized: Vec<f64> = values
            .iter()
            .map(|v| if v.is_finite() { *v } else { 0.0 })
            .collect();
        let sequence = self.time_buffer.next_sequence();
        let batch = TimestampedBatch::new(timestamp, sanitized, is_interpolated, sequence);

        let mut report = IngestReport::default();
        match self.time_buffer.push(batch) {
            PushOutcome::Duplicate => {
                self.stats.duplicates += 1;
                debug!(timestamp, "duplicate delivery dropped");
                return Err(IngestError::DuplicateBatch(timestamp));
            }
            PushOutcome::Overflowed(oldest) => {
                self.stats.overflow_releases += 1;
                warn!(
                    released = oldest.timestamp,
                    capacity = self.time_buffer.capacity(),
                    "time buffer full, releasing oldest batch early"
                );
                self.process_batch(oldest, &mut report);
            }
            PushOutcome::Accepted => {}
        }

        self.note_sanitized(values, timestamp);
        self.newest_batch = Some(self.newest_batch.map_or(timestamp, |n| n.max(timestamp)));

        let reorder_window = self.config.sampling.reorder_window_s;
        for batch in self.time_buffer.release_ready(reorder_window) {
            self.process_batch(batch, &mut report);
        }
        Ok(report)
    }

    /// Account for a batch dropped upstream of `ingest` because a reset overtook it.
    /// It still counts as data seen before the reset.
    pub fn note_discarded(&mut self, timestamp: f64) {
        if !timestamp.is_finite() {
            return;
        }
        self.newest_batch = Some(self.newest_batch.map_or(timestamp, |n| n.max(timestamp)));
        debug!(timestamp, "batch from before reset discarded");
    }

    fn note_sanitized(&mut self, values: &[f64], timestamp: f64) {
        let mut count = 0;
        for (k, value) in values.iter().enumerate() {
            if !value.is_finite() {
                count += 1;
                self.dropped_timestamps.push(timestamp + k as f64 * self.period);
            }
        }
        if count > 0 {
            self.stats.sanitized_values += count;
            warn!(timestamp, count, "non-finite values replaced with 0.0");
        }
    }

    fn process_batch(&mut self, batch: TimestampedBatch, report: &mut IngestReport) {
        report.batches_released += 1;
        let now = self.clock.now_secs();

        if !self.session_started {
            self.session_started = true;
            if self.calibration.start_if_requested(now) {
                self.clear_recording_buffers();
            }
        }

        let n = batch.values.len();
        if !batch.interpolated {
            self.counters.record_received(n as u64);
        }
        self.counters.record_expected(n as u64);

        if self.calibration.is_active() {
            self.calibration.record(&batch.values);
            self.mirror_to_display(&batch);
            if self.calibration.is_due(now) {
                report.calibration = self.finish_calibration(now);
            }
            return;
        }

        if self.config.recording.auto_start
            && !self.recording.active
            && !self.recording.auto_started
            && !self.recording.explicitly_stopped
        {
            self.recording.auto_started = true;
            self.begin_recording(now);
        }

        let raw = batch.timestamp;
        let grid = self.normalizer.round(raw);
        let (base, anchor) = match self.gap_filler.expected_next() {
            None => {
                let base = self.normalizer.normalize(raw);
                self.frame_lag = grid - base;
                (base, grid)
            }
            Some(expected) => {
                let plan = self.gap_filler.plan(
                    expected,
                    raw,
                    self.last_value,
                    batch.values[0],
                    GapTier::Record,
                );
                match plan.decision {
                    GapDecision::InSequence => {
                        let base = self.normalizer.normalize(raw);
                        let anchor = expected.max(grid);
                        self.frame_lag = anchor - base;
                        (base, anchor)
                    }
                    GapDecision::Fill { slots, strategy, aligned } => {
                        debug!(slots, ?strategy, expected, actual = raw, "filling gap");
                        for sample in &plan.samples {
                            let ts = sample.timestamp - self.frame_lag;
                            self.dropped_timestamps.push(ts);
                            self.append_sample(ts, sample.value, true, report);
                        }
                        self.counters.record_expected(slots as u64);
                        self.stats.interpolated_samples += slots as u64;
                        report.interpolated_inserted += slots;
                        let base = aligned - self.frame_lag;
                        self.normalizer.reseed(base);
                        (base, aligned)
                    }
                    GapDecision::Discontinuity { gap_s, missed_slots } => {
                        info!(gap_s, missed_slots, at = raw, "discontinuity, interpolation skipped");
                        self.counters.record_expected(missed_slots);
                        self.stats.discontinuities += 1;
                        report.discontinuities += 1;
                        let base = grid - self.frame_lag;
                        self.normalizer.reseed(base);
                        (base, grid)
                    }
                }
            }
        };
        self.gap_filler.set_anchor(anchor + (n - 1) as f64 * self.period);

        for (k, &value) in batch.values.iter().enumerate() {
            self.append_sample(base + k as f64 * self.period, value, batch.interpolated, report);
        }
    }

    /// Calibration batches reach the display only
    fn mirror_to_display(&mut self, batch: &TimestampedBatch) {
        let base = self.normalizer.normalize(batch.timestamp);
        for (k, &value) in batch.values.iter().enumerate() {
            let ts = self.next_timestamp(base + k as f64 * self.period);
            self.display.push(Sample::new(ts, value, batch.interpolated));
        }
        let grid = self.normalizer.round(batch.timestamp);
        self.frame_lag = grid - base;
        self.gap_filler.set_anchor(grid + (batch.values.len() - 1) as f64 * self.period);
        if let Some(&last) = batch.values.last() {
            self.last_value = last;
        }
    }

    /// Enforce the minimum step over the previous stored timestamp
    fn next_timestamp(&mut self, candidate: f64) -> f64 {
        let min_step = self.config.sampling.min_timestamp_step_s;
        let ts = match self.last_timestamp {
            Some(last) if candidate < last + min_step => last + min_step,
            _ => candidate,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn append_sample(&mut self, candidate: f64, value: f64, interpolated: bool, report: &mut IngestReport) {
        let timestamp = self.next_timestamp(candidate);

        let update = self.rms.push(value);
        if let Some(rms) = update.one_second {
            self.record_one_second(rms, update.long_max);
        }

        let one_second = self.rms.latest_one_second();
        let row = SeriesRow {
            timestamp,
            raw: value,
            short_rms: self.rms.latest_short(),
            one_second_rms: one_second,
            percent_reference: percent_of_reference(one_second, self.calibration.reference()),
            interpolated,
        };

        self.display.push(Sample::new(timestamp, value, interpolated));
        if self.recording.active {
            let trimmed = self.series.push(row);
            if trimmed > 0 {
                self.stats.trimmed_rows += trimmed as u64;
                report.trimmed += trimmed;
                info!(trimmed, remaining = self.series.len(), "reconstructed series trimmed");
            }
        }

        self.stats.samples_appended += 1;
        report.samples_appended += 1;
        self.last_value = value;
        if !interpolated {
            self.check_flat_signal(value);
        }
    }

    fn record_one_second(&mut self, rms: f64, long_max: Option<f64>) {
        self.one_second_history.push(rms);
        self.percent_history
            .push(percent_of_reference(rms, self.calibration.reference()));
        if let Some(max) = long_max {
            self.max_rms_history.push(max);
        }
    }

    fn check_flat_signal(&mut self, value: f64) {
        self.recent_raw.push(value);
        if self.recent_raw.len() < self.recent_raw.capacity() {
            return;
        }
        let (min, max) = self
            .recent_raw
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if max - min < self.config.acquisition.flat_signal_epsilon {
            if !self.flat_warned {
                warn!(value, run = self.recent_raw.len(), "flat signal, possible sensor issue");
                self.flat_warned = true;
            }
        } else {
            self.flat_warned = false;
        }
    }

    fn clear_recording_buffers(&mut self) {
        self.series.clear();
        self.rms.reset();
        self.one_second_history.clear();
        self.percent_history.clear();
        self.max_rms_history.clear();
    }

    fn begin_recording(&mut self, now: f64) {
        self.series.clear();
        self.recording.active = true;
        self.recording.started_at = now;
        self.recording.explicitly_stopped = false;
        info!(auto = self.recording.auto_started, "recording started");
    }

    fn finish_calibration(&mut self, now: f64) -> Option<CalibrationOutcome> {
        let outcome = self.calibration.end(now)?;
        if self.recording.active {
            self.recording.started_at = now;
        }
        Some(outcome)
    }

    /// Enter calibration, discarding the recording buffers
    pub fn start_calibration(&mut self) {
        let now = self.clock.now_secs();
        self.calibration.start(now);
        self.clear_recording_buffers();
        self.gap_filler.reset();
        self.normalizer.reset();
        self.frame_lag = 0.0;
    }

    /// End calibration now; `None` when no cycle was active
    pub fn end_calibration(&mut self) -> Option<CalibrationOutcome> {
        let now = self.clock.now_secs();
        self.finish_calibration(now)
    }

    /// Time-driven housekeeping: ends calibration once its duration has elapsed even
    /// when no data arrives
    pub fn tick(&mut self) -> Option<CalibrationOutcome> {
        let now = self.clock.now_secs();
        if self.calibration.is_due(now) {
            return self.finish_calibration(now);
        }
        None
    }

    /// Start recording into the export-bound series. Returns false when already recording.
    pub fn start_recording(&mut self) -> bool {
        if self.recording.active {
            debug!("recording already active");
            return false;
        }
        let now = self.clock.now_secs();
        self.begin_recording(now);
        true
    }

    /// Stop recording and return its duration in seconds
    ///
    /// Pending batches are drained first and partial RMS windows are flushed into the
    /// histories.
    pub fn stop_recording(&mut self) -> f64 {
        if !self.recording.active {
            return self.recording.last_duration_s;
        }

        let mut report = IngestReport::default();
        for batch in self.time_buffer.flush_pending() {
            self.process_batch(batch, &mut report);
        }
        let update = self.rms.flush();
        if let Some(rms) = update.one_second {
            self.record_one_second(rms, update.long_max);
        }

        let now = self.clock.now_secs();
        self.recording.active = false;
        self.recording.explicitly_stopped = true;
        self.recording.last_duration_s = (now - self.recording.started_at).max(0.0);
        info!(
            duration_s = self.recording.last_duration_s,
            rows = self.series.len(),
            "recording stopped"
        );
        self.recording.last_duration_s
    }

    pub fn stop_recording_and_export(&mut self) -> String {
        self.stop_recording();
        self.export_dataset()
    }

    /// Render the reconstructed series as export text
    pub fn export_dataset(&self) -> String {
        let duration = if self.recording.active {
            (self.clock.now_secs() - self.recording.started_at).max(0.0)
        } else {
            self.recording.last_duration_s
        };
        export::export_dataset(self.series.rows(), duration, self.calibration.reference())
    }

    fn capture_reset_boundary(&mut self) {
        let newest = [self.newest_batch, self.reset_boundary]
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));
        self.reset_boundary = newest;
    }

    fn clear_stream_state(&mut self) {
        self.capture_reset_boundary();
        self.time_buffer.clear();
        self.normalizer.reset();
        self.frame_lag = 0.0;
        self.gap_filler.reset();
        self.clear_recording_buffers();
        self.display.clear();
        self.dropped_timestamps.clear();
        self.recent_raw.clear();
        self.flat_warned = false;
        self.counters.reset();
        self.last_timestamp = None;
        self.last_value = 0.0;
        self.newest_batch = None;
        self.recording = RecordingState::default();
        self.session_started = false;
    }

    /// Clear every buffer, counter and the calibration reference, and arm a calibration
    /// for the next stream start
    pub fn reset_all(&mut self) {
        self.clear_stream_state();
        self.calibration.reset();
        self.calibration.request_recalibration();
        self.stats = IngestStats::default();
        info!(boundary = ?self.reset_boundary, "stream reset");
    }

    /// Clear buffers after a reconnect; the reference survives and a calibration is
    /// armed for the next stream start
    pub fn reset_after_reconnect(&mut self) {
        self.clear_stream_state();
        self.calibration.abort();
        self.calibration.request_recalibration();
        info!(boundary = ?self.reset_boundary, "buffers reset after reconnect, recalibration armed");
    }

    /// Apply a link state change and tell the transport side what to do next
    pub fn on_connection_event(&mut self, event: ConnectionEvent) -> ConnectionAction {
        match event {
            ConnectionEvent::Disconnected => {
                self.connection.connected = false;
                self.connection.had_disconnect = true;
                if self.calibration.is_active() {
                    warn!("disconnected during calibration, automatic reconnect suppressed");
                    ConnectionAction::SuppressReconnect
                } else {
                    info!("disconnected");
                    ConnectionAction::Reconnect
                }
            }
            ConnectionEvent::Connected => {
                self.connection.connected = true;
                if self.connection.had_disconnect {
                    self.connection.had_disconnect = false;
                    self.reset_after_reconnect();
                    ConnectionAction::ResetPerformed
                } else {
                    info!("connected");
                    ConnectionAction::None
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.connected
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            display: self.display.to_vec(),
            one_second_rms: self.one_second_history.to_vec(),
            percent_reference: self.percent_history.to_vec(),
            max_rms: self.max_rms_history.to_vec(),
            reference: self.calibration.reference(),
            acquisition_ratio_percent: self.counters.last_ratio_percent(),
            calibrating: self.calibration.is_active(),
            recording: self.recording.active,
            series_len: self.series.len(),
            stats: self.stats(),
        }
    }
}
