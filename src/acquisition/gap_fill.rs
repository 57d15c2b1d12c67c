// src/acquisition/gap_fill.rs
//! Gap detection and synthesis of missing samples on the nominal grid

use crate::config::constants::gap_fill::SLOT_SNAP_RESOLUTION;
use crate::config::GapFillConfig;
use crate::hal::types::Sample;
use crate::utils::time::snap_to_resolution;
use serde::{Deserialize, Serialize};

/// Tolerance for floor/ceil on the slot grid
const GRID_EPSILON: f64 = 1e-6;

/// Which ceiling applies to a gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapTier {
    /// Full-record path, 3.0 s by default
    Record,
    /// Transport-side stamping path, 0.8 s by default
    Link,
}

/// How the samples between two timestamps are synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillStrategy {
    /// Cubic Hermite blend with zero end slopes
    Smooth,
    /// Repeat the last known value
    Hold,
}

/// Classification of the distance between the expected and actual timestamps
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapDecision {
    InSequence,
    Fill {
        slots: usize,
        strategy: FillStrategy,
        /// Grid position the arriving sample takes
        aligned: f64,
    },
    Discontinuity {
        gap_s: f64,
        missed_slots: u64,
    },
}

/// Result of planning a fill: the decision plus the synthesized samples
#[derive(Debug, Clone, PartialEq)]
pub struct GapPlan {
    pub decision: GapDecision,
    pub samples: Vec<Sample>,
}

/// Gap detector holding the expected-timestamp anchor
#[derive(Debug, Clone)]
pub struct GapFiller {
    config: GapFillConfig,
    period: f64,
    anchor: Option<f64>,
}

impl GapFiller {
    /// Create new gap filler for the given nominal sample period
    pub fn new(config: GapFillConfig, period: f64) -> Self {
        Self {
            config,
            period,
            anchor: None,
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Grid position of the most recent real sample
    pub fn anchor(&self) -> Option<f64> {
        self.anchor
    }

    /// Timestamp the next sample is expected at
    pub fn expected_next(&self) -> Option<f64> {
        self.anchor.map(|a| a + self.period)
    }

    pub fn set_anchor(&mut self, anchor: f64) {
        self.anchor = Some(anchor);
    }

    pub fn reset(&mut self) {
        self.anchor = None;
    }

    pub fn ceiling(&self, tier: GapTier) -> f64 {
        match tier {
            GapTier::Record => self.config.record_ceiling_s,
            GapTier::Link => self.config.link_ceiling_s,
        }
    }

    /// Classify `actual` against `expected` under the given tier
    pub fn classify(&self, expected: f64, actual: f64, tier: GapTier) -> GapDecision {
        let gap = actual - expected;
        if gap <= self.config.small_gap_threshold_s + GRID_EPSILON {
            return GapDecision::InSequence;
        }
        if gap > self.ceiling(tier) {
            return GapDecision::Discontinuity {
                gap_s: gap,
                missed_slots: (gap / self.period + GRID_EPSILON).floor() as u64,
            };
        }

        let slots = (gap / self.period + GRID_EPSILON).floor() as usize;
        let strategy = if slots < self.config.smooth_max_slots {
            FillStrategy::Smooth
        } else {
            FillStrategy::Hold
        };
        GapDecision::Fill {
            slots,
            strategy,
            aligned: self.slot_timestamp(expected, slots),
        }
    }

    /// Classify and synthesize the missing samples between `expected` and `actual`
    pub fn plan(
        &self,
        expected: f64,
        actual: f64,
        last_value: f64,
        next_value: f64,
        tier: GapTier,
    ) -> GapPlan {
        let decision = self.classify(expected, actual, tier);
        let samples = match decision {
            GapDecision::Fill { slots, strategy, .. } => {
                let values = match strategy {
                    FillStrategy::Smooth => hermite_fill(last_value, next_value, slots),
                    FillStrategy::Hold => vec![last_value; slots],
                };
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| Sample::new(self.slot_timestamp(expected, i), value, true))
                    .collect()
            }
            _ => Vec::new(),
        };
        GapPlan { decision, samples }
    }

    fn slot_timestamp(&self, expected: f64, index: usize) -> f64 {
        snap_to_resolution(expected + index as f64 * self.period, SLOT_SNAP_RESOLUTION)
    }
}

/// Cubic Hermite values for `count` evenly spaced interior points between two samples
///
/// Point i sits at t = i / (count + 1); both end tangents are zero.
pub fn hermite_fill(previous: f64, next: f64, count: usize) -> Vec<f64> {
    let steps = (count + 1) as f64;
    (1..=count)
        .map(|i| {
            let t = i as f64 / steps;
            let t2 = t * t;
            let t3 = t2 * t;
            (2.0 * t3 - 3.0 * t2 + 1.0) * previous + (-2.0 * t3 + 3.0 * t2) * next
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler() -> GapFiller {
        GapFiller::new(GapFillConfig::default(), 0.1)
    }

    #[test]
    fn test_in_sequence_sample() {
        let f = filler();
        assert_eq!(f.classify(0.1, 0.1, GapTier::Record), GapDecision::InSequence);
        assert_eq!(f.classify(0.1, 0.2, GapTier::Record), GapDecision::InSequence);
        // early arrivals are never gaps
        assert_eq!(f.classify(0.5, 0.2, GapTier::Record), GapDecision::InSequence);
    }

    #[test]
    fn test_small_gap_is_smoothed() {
        let f = filler();
        let plan = f.plan(0.1, 0.35, 1.0, 2.0, GapTier::Record);
        match plan.decision {
            GapDecision::Fill { slots, strategy, aligned } => {
                assert_eq!(slots, 2);
                assert_eq!(strategy, FillStrategy::Smooth);
                assert!((aligned - 0.3).abs() < 1e-9);
            }
            other => panic!("expected fill, got {other:?}"),
        }
        assert_eq!(plan.samples.len(), 2);
        assert!((plan.samples[0].timestamp - 0.1).abs() < 1e-9);
        assert!((plan.samples[1].timestamp - 0.2).abs() < 1e-9);
        assert!(plan.samples.iter().all(|s| s.interpolated));
        assert!((plan.samples[0].value - 1.259259).abs() < 1e-5);
        assert!((plan.samples[1].value - 1.740741).abs() < 1e-5);
    }

    #[test]
    fn test_long_gap_holds_last_value() {
        let f = filler();
        let plan = f.plan(1.0, 2.5, 0.7, 3.0, GapTier::Record);
        match plan.decision {
            GapDecision::Fill { slots, strategy, .. } => {
                assert_eq!(slots, 15);
                assert_eq!(strategy, FillStrategy::Hold);
            }
            other => panic!("expected fill, got {other:?}"),
        }
        assert!(plan.samples.iter().all(|s| s.value == 0.7));
        let last = plan.samples.last().unwrap();
        assert!((last.timestamp - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_gap_beyond_ceiling_is_discontinuity() {
        let f = filler();
        let plan = f.plan(0.1, 5.0, 1.0, 2.0, GapTier::Record);
        assert!(plan.samples.is_empty());
        match plan.decision {
            GapDecision::Discontinuity { missed_slots, .. } => assert_eq!(missed_slots, 49),
            other => panic!("expected discontinuity, got {other:?}"),
        }
    }

    #[test]
    fn test_link_tier_has_lower_ceiling() {
        let f = filler();
        assert!(matches!(f.classify(0.1, 1.05, GapTier::Record), GapDecision::Fill { .. }));
        assert!(matches!(
            f.classify(0.1, 1.05, GapTier::Link),
            GapDecision::Discontinuity { .. }
        ));
    }

    #[test]
    fn test_hermite_endpoints_approach_neighbours() {
        let values = hermite_fill(0.0, 1.0, 9);
        assert_eq!(values.len(), 9);
        assert!(values.windows(2).all(|w| w[1] > w[0]));
        assert!((values[4] - 0.5).abs() < 1e-12);
        assert!(hermite_fill(1.0, 2.0, 0).is_empty());
    }

    #[test]
    fn test_anchor_tracking() {
        let mut f = filler();
        assert_eq!(f.expected_next(), None);
        f.set_anchor(5.0);
        assert!((f.expected_next().unwrap() - 5.1).abs() < 1e-12);
        f.reset();
        assert_eq!(f.anchor(), None);
    }
}
