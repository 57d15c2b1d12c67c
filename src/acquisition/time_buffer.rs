// src/acquisition/time_buffer.rs
//! Bounded priority buffer that reorders out-of-sequence batch deliveries

use crate::hal::types::TimestampedBatch;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Released batches remembered for duplicate detection
const RECENT_RELEASED: usize = 32;

/// Outcome of pushing a batch
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Accepted,
    /// Identical delivery already pending
    Duplicate,
    /// Capacity exceeded; the oldest pending batch was released early
    Overflowed(TimestampedBatch),
}

/// Array-backed binary min-heap of batches keyed by timestamp, then arrival sequence
#[derive(Debug)]
pub struct TimeBuffer {
    heap: Vec<TimestampedBatch>,
    capacity: usize,
    next_sequence: u64,
    latest_seen: f64,
    recent: VecDeque<TimestampedBatch>,
    duplicates_rejected: u64,
    overflow_releases: u64,
}

impl TimeBuffer {
    /// Create new time buffer holding at most `capacity` batches
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            heap: Vec::with_capacity(capacity),
            capacity,
            next_sequence: 0,
            latest_seen: f64::NEG_INFINITY,
            recent: VecDeque::with_capacity(RECENT_RELEASED),
            duplicates_rejected: 0,
            overflow_releases: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest timestamp ever pushed, used as the release watermark
    pub fn latest_seen(&self) -> f64 {
        self.latest_seen
    }

    pub fn duplicates_rejected(&self) -> u64 {
        self.duplicates_rejected
    }

    pub fn overflow_releases(&self) -> u64 {
        self.overflow_releases
    }

    /// Allocate the next arrival sequence number
    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    pub fn peek(&self) -> Option<&TimestampedBatch> {
        self.heap.first()
    }

    /// Insert a batch. Content identical to a pending or recently released batch is
    /// rejected as a duplicate.
    pub fn push(&mut self, batch: TimestampedBatch) -> PushOutcome {
        if self
            .heap
            .iter()
            .chain(self.recent.iter())
            .any(|seen| seen.same_content(&batch))
        {
            self.duplicates_rejected += 1;
            return PushOutcome::Duplicate;
        }

        if batch.timestamp > self.latest_seen {
            self.latest_seen = batch.timestamp;
        }

        self.heap.push(batch);
        self.sift_up(self.heap.len() - 1);

        if self.heap.len() > self.capacity {
            if let Some(oldest) = self.pop() {
                self.overflow_releases += 1;
                return PushOutcome::Overflowed(oldest);
            }
        }
        PushOutcome::Accepted
    }

    /// Remove and return the oldest batch
    pub fn pop(&mut self) -> Option<TimestampedBatch> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let top = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        if let Some(batch) = &top {
            if self.recent.len() == RECENT_RELEASED {
                self.recent.pop_front();
            }
            self.recent.push_back(batch.clone());
        }
        top
    }

    /// Release every batch at or older than `latest_seen - reorder_window_s`, oldest first
    pub fn release_ready(&mut self, reorder_window_s: f64) -> Vec<TimestampedBatch> {
        let watermark = self.latest_seen - reorder_window_s.max(0.0);
        let mut ready = Vec::new();
        while self.peek().is_some_and(|b| b.timestamp <= watermark) {
            if let Some(batch) = self.pop() {
                ready.push(batch);
            }
        }
        ready
    }

    /// Drain all pending batches in order
    pub fn flush_pending(&mut self) -> Vec<TimestampedBatch> {
        let mut drained = Vec::with_capacity(self.heap.len());
        while let Some(batch) = self.pop() {
            drained.push(batch);
        }
        drained
    }

    /// Drop all pending batches and forget the watermark
    pub fn clear(&mut self) {
        self.heap.clear();
        self.recent.clear();
        self.latest_seen = f64::NEG_INFINITY;
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.heap[a].order_key(&self.heap[b]) == Ordering::Less
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.heap.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.heap.swap(idx, smallest);
            idx = smallest;
        }
    }
}
