// src/acquisition/history.rs
//! Bounded history buffers: the index-aligned reconstructed series and display series

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// One row of the reconstructed series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub timestamp: f64,
    pub raw: f64,
    pub short_rms: f64,
    pub one_second_rms: f64,
    pub percent_reference: f64,
    pub interpolated: bool,
}

/// Index-aligned columns of the export-bound series
///
/// All columns have the same length after every public operation. Trimming drops the
/// same number of oldest entries from every column.
#[derive(Debug, Clone)]
pub struct ReconstructedSeries {
    timestamps: VecDeque<f64>,
    raw: VecDeque<f64>,
    short_rms: VecDeque<f64>,
    one_second_rms: VecDeque<f64>,
    percent_reference: VecDeque<f64>,
    interpolated: VecDeque<bool>,
    high_water_mark: usize,
    trim_target: usize,
    trimmed_total: u64,
    repairs: u64,
}

impl ReconstructedSeries {
    /// Create new series trimmed to `trim_target` rows whenever it exceeds `high_water_mark`
    pub fn new(high_water_mark: usize, trim_target: usize) -> Self {
        let trim_target = trim_target.min(high_water_mark);
        Self {
            timestamps: VecDeque::with_capacity(high_water_mark + 1),
            raw: VecDeque::with_capacity(high_water_mark + 1),
            short_rms: VecDeque::with_capacity(high_water_mark + 1),
            one_second_rms: VecDeque::with_capacity(high_water_mark + 1),
            percent_reference: VecDeque::with_capacity(high_water_mark + 1),
            interpolated: VecDeque::with_capacity(high_water_mark + 1),
            high_water_mark,
            trim_target,
            trimmed_total: 0,
            repairs: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.back().copied()
    }

    pub fn last_raw(&self) -> Option<f64> {
        self.raw.back().copied()
    }

    /// Rows dropped by trimming since creation or the last clear
    pub fn trimmed_total(&self) -> u64 {
        self.trimmed_total
    }

    /// Alignment repairs performed
    pub fn repairs(&self) -> u64 {
        self.repairs
    }

    fn column_lengths(&self) -> [usize; 6] {
        [
            self.timestamps.len(),
            self.raw.len(),
            self.short_rms.len(),
            self.one_second_rms.len(),
            self.percent_reference.len(),
            self.interpolated.len(),
        ]
    }

    pub fn is_aligned(&self) -> bool {
        let lengths = self.column_lengths();
        lengths.iter().all(|&l| l == lengths[0])
    }

    /// Drop the oldest entries of any column longer than the shortest one.
    /// Returns the number of entries removed.
    pub fn repair_alignment(&mut self) -> usize {
        let lengths = self.column_lengths();
        let Some(&shortest) = lengths.iter().min() else {
            return 0;
        };
        let mut removed = 0;
        removed += drop_front(&mut self.timestamps, shortest);
        removed += drop_front(&mut self.raw, shortest);
        removed += drop_front(&mut self.short_rms, shortest);
        removed += drop_front(&mut self.one_second_rms, shortest);
        removed += drop_front(&mut self.percent_reference, shortest);
        removed += drop_front(&mut self.interpolated, shortest);
        if removed > 0 {
            self.repairs += 1;
            warn!(removed, len = shortest, "reconstructed series misaligned, dropped oldest entries");
        }
        removed
    }

    /// Append one row to every column in lockstep, then trim if above the high-water mark
    pub fn push(&mut self, row: SeriesRow) -> usize {
        if !self.is_aligned() {
            self.repair_alignment();
        }
        self.timestamps.push_back(row.timestamp);
        self.raw.push_back(row.raw);
        self.short_rms.push_back(row.short_rms);
        self.one_second_rms.push_back(row.one_second_rms);
        self.percent_reference.push_back(row.percent_reference);
        self.interpolated.push_back(row.interpolated);
        self.trim()
    }

    /// Returns the number of rows dropped
    pub fn trim(&mut self) -> usize {
        let len = self.len();
        if len <= self.high_water_mark {
            return 0;
        }
        let drop = len - self.trim_target;
        self.timestamps.drain(..drop);
        self.raw.drain(..drop);
        self.short_rms.drain(..drop);
        self.one_second_rms.drain(..drop);
        self.percent_reference.drain(..drop);
        self.interpolated.drain(..drop);
        self.trimmed_total += drop as u64;
        debug!(dropped = drop, remaining = self.len(), "trimmed reconstructed series");
        drop
    }

    pub fn row(&self, index: usize) -> Option<SeriesRow> {
        Some(SeriesRow {
            timestamp: *self.timestamps.get(index)?,
            raw: *self.raw.get(index)?,
            short_rms: *self.short_rms.get(index)?,
            one_second_rms: *self.one_second_rms.get(index)?,
            percent_reference: *self.percent_reference.get(index)?,
            interpolated: *self.interpolated.get(index)?,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = SeriesRow> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i))
    }

    pub fn timestamps(&self) -> &VecDeque<f64> {
        &self.timestamps
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.raw.clear();
        self.short_rms.clear();
        self.one_second_rms.clear();
        self.percent_reference.clear();
        self.interpolated.clear();
        self.trimmed_total = 0;
    }

    #[cfg(test)]
    pub(crate) fn desync_for_test(&mut self, extra_raw: f64) {
        self.raw.push_back(extra_raw);
    }
}

fn drop_front<T>(column: &mut VecDeque<T>, target_len: usize) -> usize {
    let excess = column.len().saturating_sub(target_len);
    column.drain(..excess);
    excess
}

/// FIFO series bounded by capacity; on overflow it keeps the newest `keep` entries
#[derive(Debug, Clone)]
pub struct BoundedSeries<T> {
    items: VecDeque<T>,
    capacity: usize,
    keep: usize,
}

impl<T: Clone> BoundedSeries<T> {
    /// Evicts one entry at a time once full
    pub fn new(capacity: usize) -> Self {
        Self::with_trim(capacity, capacity)
    }

    /// Trims down to `keep` entries once `capacity` is exceeded
    pub fn with_trim(capacity: usize, keep: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity,
            keep: keep.clamp(1, capacity),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            let excess = self.items.len() - self.keep;
            self.items.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: f64) -> SeriesRow {
        SeriesRow {
            timestamp: ts,
            raw: ts * 2.0,
            short_rms: 0.0,
            one_second_rms: 0.0,
            percent_reference: 0.0,
            interpolated: false,
        }
    }

    #[test]
    fn test_push_keeps_columns_aligned() {
        let mut series = ReconstructedSeries::new(100, 50);
        for i in 0..10 {
            series.push(row(i as f64));
        }
        assert_eq!(series.len(), 10);
        assert!(series.is_aligned());
        assert_eq!(series.row(3).map(|r| r.raw), Some(6.0));
    }

    #[test]
    fn test_trim_above_high_water_mark() {
        let mut series = ReconstructedSeries::new(10, 5);
        for i in 0..10 {
            assert_eq!(series.push(row(i as f64)), 0);
        }
        assert_eq!(series.push(row(10.0)), 6);
        assert_eq!(series.len(), 5);
        assert_eq!(series.row(0).map(|r| r.timestamp), Some(6.0));
        assert_eq!(series.trimmed_total(), 6);
        assert!(series.is_aligned());
    }

    #[test]
    fn test_misalignment_repaired_before_append() {
        let mut series = ReconstructedSeries::new(100, 50);
        series.push(row(0.0));
        series.push(row(0.1));
        series.desync_for_test(99.0);
        assert!(!series.is_aligned());

        series.push(row(0.2));
        assert!(series.is_aligned());
        assert_eq!(series.len(), 3);
        assert_eq!(series.repairs(), 1);
        // the extra raw entry pushed out the oldest raw value
        assert_eq!(series.row(0).map(|r| r.raw), Some(0.2));
    }

    #[test]
    fn test_bounded_series_evicts_oldest() {
        let mut series = BoundedSeries::new(3);
        for i in 0..5 {
            series.push(i);
        }
        assert_eq!(series.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_bounded_series_trims_to_keep() {
        let mut series = BoundedSeries::with_trim(10, 9);
        for i in 0..11 {
            series.push(i);
        }
        assert_eq!(series.len(), 9);
        assert_eq!(series.last(), Some(&10));
    }
}
