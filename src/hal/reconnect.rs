// src/hal/reconnect.rs
//! Bounded reconnect policy with fixed per-attempt delays

use crate::config::TransportConfig;
use crate::error::{EmgError, EmgErrorBuilder};
use std::time::Duration;
use tracing::{info, warn};

/// Tracks reconnect attempts after a link loss
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delays: Vec<Duration>,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create new policy from transport settings
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            max_attempts: config.reconnect_attempts,
            delays: (0..config.reconnect_attempts).map(|i| config.reconnect_delay(i)).collect(),
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Delay before the next attempt, or `None` when all attempts are used
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delays.get(self.attempts as usize).copied().unwrap_or_default();
        self.attempts += 1;
        info!(attempt = self.attempts, max = self.max_attempts, delay_ms = delay.as_millis() as u64,
              "scheduling reconnect");
        Some(delay)
    }

    /// Like `next_attempt`, surfacing exhaustion as an error
    pub fn try_next_attempt(&mut self) -> Result<Duration, EmgError> {
        self.next_attempt().ok_or_else(|| {
            warn!(attempts = self.attempts, "reconnect attempts exhausted");
            let delays_ms: Vec<u128> = self.delays.iter().map(Duration::as_millis).collect();
            EmgErrorBuilder::new("transport", "reconnect")
                .with_info("delays_ms", format!("{delays_ms:?}"))
                .reconnect_exhausted(self.attempts)
        })
    }

    /// Clear the attempt count once data flows again
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
