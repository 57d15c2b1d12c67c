// src/hal/link_clock.rs
//! Transport-side batch stamping from notification arrival times

use crate::acquisition::gap_fill::{GapDecision, GapFiller, GapTier};
use crate::acquisition::normalizer::TimestampNormalizer;
use crate::config::StreamConfig;
use crate::hal::types::Sample;
use tracing::{debug, warn};

/// Timestamp assigned to one notification, plus link-level fill for lost notifications
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStamp {
    pub timestamp: f64,
    pub fill: Vec<Sample>,
}

/// Assigns evenly spaced timestamps to bursty arrivals
///
/// Arrivals near the expected slot take the slot, so bursts are spread back onto the
/// grid. Lost notifications under the link ceiling are synthesized; larger jumps and
/// arrivals more than the realign threshold away from the anchor restart the clock.
#[derive(Debug, Clone)]
pub struct LinkClock {
    normalizer: TimestampNormalizer,
    gap_filler: GapFiller,
    realign_threshold_s: f64,
    period: f64,
    expected: Option<f64>,
    last_value: Option<f64>,
    realignments: u64,
}

impl LinkClock {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            normalizer: TimestampNormalizer::new(
                config.sampling.timestamp_precision,
                config.sampling.smoothing_window,
            ),
            gap_filler: GapFiller::new(config.gap_fill.clone(), config.sampling.sample_period_s),
            realign_threshold_s: config.gap_fill.link_realign_threshold_s,
            period: config.sampling.sample_period_s,
            expected: None,
            last_value: None,
            realignments: 0,
        }
    }

    pub fn expected_next(&self) -> Option<f64> {
        self.expected
    }

    pub fn realignments(&self) -> u64 {
        self.realignments
    }

    /// Stamp a notification of `values` that arrived at `arrival_s`
    pub fn stamp(&mut self, arrival_s: f64, values: &[f64]) -> LinkStamp {
        let arrival = self.normalizer.round(arrival_s);
        let first_value = values.first().copied().unwrap_or(0.0);

        let mut expected = *self.expected.get_or_insert(arrival);
        if (arrival - expected).abs() > self.realign_threshold_s {
            warn!(arrival, expected, "link clock drifted, realigning");
            self.realignments += 1;
            expected = arrival;
        }

        let last_value = self.last_value.unwrap_or(first_value);
        let plan = self
            .gap_filler
            .plan(expected, arrival, last_value, first_value, GapTier::Link);
        let timestamp = match plan.decision {
            GapDecision::InSequence => expected,
            GapDecision::Fill { slots, aligned, .. } => {
                debug!(slots, "link-level loss, synthesizing notifications");
                aligned
            }
            GapDecision::Discontinuity { gap_s, .. } => {
                warn!(gap_s, "link gap beyond ceiling, realigning");
                self.realignments += 1;
                arrival
            }
        };

        self.expected = Some(timestamp + values.len().max(1) as f64 * self.period);
        if let Some(&last) = values.last() {
            self.last_value = Some(last);
        }

        LinkStamp {
            timestamp,
            fill: plan.samples,
        }
    }

    /// Forget the anchor, e.g. after a reconnect
    pub fn reset(&mut self) {
        self.normalizer.reset();
        self.expected = None;
        self.last_value = None;
    }
}
