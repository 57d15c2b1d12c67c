// src/hal/simulator.rs
//! Bursty wireless link simulator
//!
//! Produces notification payloads the way a lossy low-energy radio link delivers them:
//! arrivals jitter around the nominal period, some notifications are lost, some are
//! delivered twice, and runs of notifications are held back and released together.

use crate::hal::codec::encode_payload;
use crate::hal::traits::SampleTransport;
use crate::hal::types::{ConnectionEvent, TransportEvent};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// Simulator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    pub sample_period_s: f64,
    pub values_per_payload: usize,
    pub payload_scale: f64,
    pub signal_amplitude: f64,
    pub noise_level: f64,
    /// Seconds of a full activation cycle of the simulated muscle
    pub activation_period_s: f64,
    pub jitter_s: f64,
    pub drop_probability: f64,
    pub duplicate_probability: f64,
    pub burst_probability: f64,
    pub max_burst_len: usize,
    /// Emit a disconnect after this many payloads
    pub disconnect_after: Option<u64>,
    /// End the feed after this many payloads
    pub total_payloads: Option<u64>,
    /// Sleep until each arrival time instead of delivering immediately
    pub realtime: bool,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sample_period_s: 0.1,
            values_per_payload: 1,
            payload_scale: 1000.0,
            signal_amplitude: 1.5,
            noise_level: 0.05,
            activation_period_s: 4.0,
            jitter_s: 0.02,
            drop_probability: 0.05,
            duplicate_probability: 0.02,
            burst_probability: 0.05,
            max_burst_len: 4,
            disconnect_after: None,
            total_payloads: None,
            realtime: false,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Validate probabilities and timing
    pub fn validate(&self) -> Result<(), SimulatorError> {
        let probabilities = [
            ("drop_probability", self.drop_probability),
            ("duplicate_probability", self.duplicate_probability),
            ("burst_probability", self.burst_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimulatorError::Configuration(format!("{name} must be within 0..=1, got {p}")));
            }
        }
        if !(self.sample_period_s > 0.0) {
            return Err(SimulatorError::Configuration("sample_period_s must be positive".into()));
        }
        if self.values_per_payload == 0 {
            return Err(SimulatorError::Configuration("values_per_payload must be at least 1".into()));
        }
        Ok(())
    }
}

/// Simulator errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulatorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Simulator is not connected")]
    NotConnected,
}

/// Counters describing what the simulated link did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorStats {
    pub generated: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub bursts: u64,
    pub delivered: u64,
}

/// Simulated lossy link implementing `SampleTransport`
pub struct BurstyLinkSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    connected: bool,
    pending: VecDeque<TransportEvent>,
    held: Vec<Vec<u8>>,
    burst_remaining: usize,
    sequence: u64,
    link_time_s: f64,
    delivered_time_s: f64,
    started_at: Option<tokio::time::Instant>,
    stats: SimulatorStats,
}

impl BurstyLinkSimulator {
    /// Create new simulator
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            rng,
            connected: false,
            pending: VecDeque::new(),
            held: Vec::new(),
            burst_remaining: 0,
            sequence: 0,
            link_time_s: 0.0,
            delivered_time_s: 0.0,
            started_at: None,
            stats: SimulatorStats::default(),
        })
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }

    /// Simulated link time of the most recent notification
    pub fn link_time_s(&self) -> f64 {
        self.link_time_s
    }

    fn signal_value(&mut self, t: f64) -> f64 {
        let phase = (t / self.config.activation_period_s) * std::f64::consts::TAU;
        let envelope = 0.5 * (1.0 - phase.cos());
        let noise = self.rng.gen_range(-1.0..=1.0) * self.config.noise_level;
        (self.config.signal_amplitude * envelope + noise).abs()
    }

    fn feed_finished(&self) -> bool {
        self.config
            .total_payloads
            .is_some_and(|total| self.sequence >= total)
    }

    /// Advance the link by one notification, queueing whatever it delivers
    fn step(&mut self) {
        let period = self.config.sample_period_s * self.config.values_per_payload as f64;
        let t = self.sequence as f64 * period;
        self.sequence += 1;
        self.link_time_s = t;
        self.stats.generated += 1;

        let values: Vec<f64> = (0..self.config.values_per_payload)
            .map(|i| self.signal_value(t + i as f64 * self.config.sample_period_s))
            .collect();
        let bytes = encode_payload(&values, self.config.payload_scale);

        if self.rng.gen_bool(self.config.drop_probability) {
            self.stats.dropped += 1;
        } else if self.burst_remaining > 0 || self.rng.gen_bool(self.config.burst_probability) {
            if self.burst_remaining == 0 {
                self.stats.bursts += 1;
                self.burst_remaining = self.rng.gen_range(1..=self.config.max_burst_len.max(1));
            }
            self.held.push(bytes);
            self.burst_remaining -= 1;
            if self.burst_remaining == 0 {
                self.release_held(t);
            }
        } else {
            let jitter = self.rng.gen_range(-1.0..=1.0) * self.config.jitter_s;
            self.deliver(bytes.clone(), t + jitter);
            if self.rng.gen_bool(self.config.duplicate_probability) {
                self.stats.duplicated += 1;
                self.deliver(bytes, t + jitter);
            }
        }

        if self
            .config
            .disconnect_after
            .is_some_and(|n| self.sequence == n)
        {
            self.release_held(t);
            self.connected = false;
            self.pending
                .push_back(TransportEvent::Connection(ConnectionEvent::Disconnected));
        }
    }

    fn release_held(&mut self, arrival_s: f64) {
        for bytes in std::mem::take(&mut self.held) {
            self.deliver(bytes, arrival_s);
        }
        self.burst_remaining = 0;
    }

    fn deliver(&mut self, bytes: Vec<u8>, arrival_s: f64) {
        // arrivals never run backwards on a real link
        let arrival_s = arrival_s.max(self.delivered_time_s);
        self.delivered_time_s = arrival_s;
        self.stats.delivered += 1;
        self.pending.push_back(TransportEvent::Payload { bytes, arrival_s });
    }
}

#[async_trait]
impl SampleTransport for BurstyLinkSimulator {
    type Error = SimulatorError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if !self.connected {
            self.connected = true;
            self.started_at.get_or_insert_with(tokio::time::Instant::now);
            self.pending
                .push_back(TransportEvent::Connection(ConnectionEvent::Connected));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        if self.connected {
            self.connected = false;
            self.held.clear();
            self.pending
                .push_back(TransportEvent::Connection(ConnectionEvent::Disconnected));
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<TransportEvent>, Self::Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if let (true, Some(start), TransportEvent::Payload { arrival_s, .. }) =
                    (self.config.realtime, self.started_at, &event)
                {
                    tokio::time::sleep_until(start + Duration::from_secs_f64(arrival_s.max(0.0))).await;
                }
                return Ok(Some(event));
            }
            if !self.connected {
                return Err(SimulatorError::NotConnected);
            }
            if self.feed_finished() {
                if self.held.is_empty() {
                    return Ok(None);
                }
                let t = self.link_time_s;
                self.release_held(t);
                continue;
            }
            self.step();
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
