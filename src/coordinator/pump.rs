// src/coordinator/pump.rs
//! Bridges a `SampleTransport` into the ingest service

use crate::coordinator::service::IngestHandle;
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::hal::codec::decode_payload;
use crate::hal::link_clock::LinkClock;
use crate::hal::reconnect::ReconnectPolicy;
use crate::hal::traits::SampleTransport;
use crate::hal::types::{ConnectionAction, ConnectionEvent, TransportEvent};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the pump stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PumpExit {
    #[default]
    FeedFinished,
    Cancelled,
    /// The link dropped during calibration and reconnecting was suppressed
    ReconnectSuppressed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PumpStats {
    pub payloads: u64,
    pub malformed: u64,
    pub duplicates_suppressed: u64,
    pub link_fill_samples: u64,
    pub reconnects: u64,
    pub exit: PumpExit,
}

/// Reads transport events, stamps payloads and forwards everything to the service
pub struct TransportPump<T: SampleTransport> {
    transport: T,
    handle: IngestHandle,
    link_clock: LinkClock,
    policy: ReconnectPolicy,
    payload_scale: f64,
    last_payload: Option<(Vec<u8>, f64)>,
    stats: PumpStats,
}

impl<T: SampleTransport> TransportPump<T> {
    pub fn new(
        transport: T,
        handle: IngestHandle,
        link_clock: LinkClock,
        policy: ReconnectPolicy,
        payload_scale: f64,
    ) -> Self {
        Self {
            transport,
            handle,
            link_clock,
            policy,
            payload_scale,
            last_payload: None,
            stats: PumpStats::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run until the feed ends, the token is cancelled or reconnecting fails
    ///
    /// Exhausting the reconnect policy returns `EmgError::ReconnectExhausted`.
    pub async fn run(mut self, cancel: CancellationToken) -> EmgResult<PumpStats> {
        self.connect().await?;

        let exit = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break PumpExit::Cancelled,
                event = self.transport.next_event() => event,
            };

            let action = match event {
                Ok(Some(TransportEvent::Payload { bytes, arrival_s })) => {
                    self.forward_payload(bytes, arrival_s).await?;
                    continue;
                }
                Ok(Some(TransportEvent::Connection(event))) => self.handle.connection_event(event).await?,
                Ok(None) => break PumpExit::FeedFinished,
                Err(e) => {
                    warn!(error = %e, "transport error, treating as disconnect");
                    self.handle.connection_event(ConnectionEvent::Disconnected).await?
                }
            };

            match action {
                ConnectionAction::None => {}
                ConnectionAction::ResetPerformed => {
                    self.link_clock.reset();
                    self.last_payload = None;
                }
                ConnectionAction::SuppressReconnect => break PumpExit::ReconnectSuppressed,
                ConnectionAction::Reconnect => {
                    if !self.reconnect(&cancel).await? {
                        break PumpExit::Cancelled;
                    }
                }
            }
        };

        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "transport disconnect failed");
            }
        }
        self.stats.exit = exit;
        info!(?exit, payloads = self.stats.payloads, "transport pump stopped");
        Ok(self.stats)
    }

    async fn connect(&mut self) -> EmgResult<()> {
        self.transport
            .connect()
            .await
            .map_err(|e| {
                EmgErrorBuilder::new("transport", "connect")
                    .with_info("payloads", self.stats.payloads)
                    .transport(&e.to_string())
            })
    }

    /// Returns false when cancelled while waiting
    async fn reconnect(&mut self, cancel: &CancellationToken) -> EmgResult<bool> {
        loop {
            let delay = self.policy.try_next_attempt()?;
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(delay) => {}
            }
            match self.transport.connect().await {
                Ok(()) => {
                    self.stats.reconnects += 1;
                    info!(attempt = self.policy.attempts(), "transport reconnected");
                    return Ok(true);
                }
                Err(e) => warn!(attempt = self.policy.attempts(), error = %e, "reconnect failed"),
            }
        }
    }

    async fn forward_payload(&mut self, bytes: Vec<u8>, arrival_s: f64) -> EmgResult<()> {
        if self
            .last_payload
            .as_ref()
            .is_some_and(|(last, at)| *last == bytes && at.to_bits() == arrival_s.to_bits())
        {
            self.stats.duplicates_suppressed += 1;
            debug!(arrival_s, "duplicate notification suppressed");
            return Ok(());
        }

        let values = match decode_payload(&bytes, self.payload_scale) {
            Ok(values) => values,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, len = bytes.len(), "malformed payload skipped");
                return Ok(());
            }
        };
        self.last_payload = Some((bytes, arrival_s));
        self.stats.payloads += 1;
        self.policy.reset();

        let stamp = self.link_clock.stamp(arrival_s, &values);
        if let Some(first) = stamp.fill.first() {
            let fill: Vec<f64> = stamp.fill.iter().map(|s| s.value).collect();
            self.stats.link_fill_samples += fill.len() as u64;
            self.handle.send_batch(fill, first.timestamp, true).await?;
        }
        self.handle.send_batch(values, stamp.timestamp, false).await?;
        Ok(())
    }
}
