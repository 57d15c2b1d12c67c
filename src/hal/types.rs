// src/hal/types.rs
//! Core types shared between the transport side and the ingest pipeline

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Single reconstructed EMG sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
    pub interpolated: bool,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64, interpolated: bool) -> Self {
        Self {
            timestamp,
            value,
            interpolated,
        }
    }
}

/// A delivery of consecutive samples sharing one base timestamp
///
/// Batches order by timestamp; equal timestamps fall back to arrival `sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedBatch {
    pub timestamp: f64,
    pub values: Vec<f64>,
    pub interpolated: bool,
    pub sequence: u64,
}

impl TimestampedBatch {
    pub fn new(timestamp: f64, values: Vec<f64>, interpolated: bool, sequence: u64) -> Self {
        Self {
            timestamp,
            values,
            interpolated,
            sequence,
        }
    }

    /// Same delivery content, ignoring arrival order
    pub fn same_content(&self, other: &TimestampedBatch) -> bool {
        self.timestamp.to_bits() == other.timestamp.to_bits()
            && self.interpolated == other.interpolated
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// Heap ordering key
    pub fn order_key(&self, other: &TimestampedBatch) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Link state notifications from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// What the transport side should do after a connection event was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionAction {
    /// Nothing to do
    None,
    /// Attempt to reconnect following the reconnect policy
    Reconnect,
    /// Link dropped during calibration; do not reconnect automatically
    SuppressReconnect,
    /// Buffers were reset after a reconnect and recalibration is armed
    ResetPerformed,
}

/// Events produced by a `SampleTransport`
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Raw notification payload with its arrival time in seconds
    Payload { bytes: Vec<u8>, arrival_s: f64 },
    Connection(ConnectionEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ordering_breaks_ties_by_sequence() {
        let a = TimestampedBatch::new(1.0, vec![1.0], false, 2);
        let b = TimestampedBatch::new(1.0, vec![2.0], false, 1);
        let c = TimestampedBatch::new(0.5, vec![3.0], false, 9);
        assert_eq!(a.order_key(&b), Ordering::Greater);
        assert_eq!(c.order_key(&a), Ordering::Less);
    }

    #[test]
    fn test_same_content_ignores_sequence() {
        let a = TimestampedBatch::new(1.0, vec![1.0, 2.0], false, 1);
        let b = TimestampedBatch::new(1.0, vec![1.0, 2.0], false, 7);
        let c = TimestampedBatch::new(1.0, vec![1.0, 2.5], false, 7);
        assert!(a.same_content(&b));
        assert!(!a.same_content(&c));
    }
}
