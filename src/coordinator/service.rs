// src/coordinator/service.rs
//! Async service around the ingest coordinator
//!
//! One tokio task owns the coordinator and applies commands from a bounded channel in
//! arrival order. A second task evaluates the acquisition ratio on its own interval
//! from the shared counters. Both stop on the same cancellation token.

use crate::acquisition::history::BoundedSeries;
use crate::acquisition::ratio::{AcquisitionCounters, AcquisitionMonitor, RatioSample};
use crate::config::StreamConfig;
use crate::coordinator::ingest::{IngestCoordinator, IngestStats, Snapshot};
use crate::error::{ConfigError, ServiceError};
use crate::hal::types::{ConnectionAction, ConnectionEvent};
use crate::processing::calibration::CalibrationOutcome;
use crate::utils::time::Clock;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum Command {
    Batch {
        epoch: u64,
        values: Vec<f64>,
        timestamp: f64,
        interpolated: bool,
    },
    Connection(ConnectionEvent, oneshot::Sender<ConnectionAction>),
    StartCalibration,
    EndCalibration(oneshot::Sender<Option<CalibrationOutcome>>),
    ResetAll,
    StartRecording(oneshot::Sender<bool>),
    StopAndExport(oneshot::Sender<String>),
    Export(oneshot::Sender<String>),
    Stats(oneshot::Sender<IngestStats>),
    Snapshot(oneshot::Sender<Snapshot>),
}

/// Cloneable front end of a running service
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Command>,
    epoch: Arc<AtomicU64>,
    snapshots: watch::Receiver<Snapshot>,
    ratio_history: Arc<RwLock<BoundedSeries<RatioSample>>>,
    counters: Arc<AcquisitionCounters>,
    cancel: CancellationToken,
}

impl IngestHandle {
    async fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.tx.send(command).await.map_err(|_| ServiceError::ChannelClosed)
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| ServiceError::ReplyDropped)
    }

    /// Queue a batch stamped with the current reset epoch
    pub async fn send_batch(
        &self,
        values: Vec<f64>,
        timestamp: f64,
        interpolated: bool,
    ) -> Result<(), ServiceError> {
        let epoch = self.epoch.load(Ordering::Acquire);
        self.send(Command::Batch {
            epoch,
            values,
            timestamp,
            interpolated,
        })
        .await
    }

    pub async fn connection_event(&self, event: ConnectionEvent) -> Result<ConnectionAction, ServiceError> {
        self.request(|reply| Command::Connection(event, reply)).await
    }

    pub async fn start_calibration(&self) -> Result<(), ServiceError> {
        self.send(Command::StartCalibration).await
    }

    pub async fn end_calibration(&self) -> Result<Option<CalibrationOutcome>, ServiceError> {
        self.request(Command::EndCalibration).await
    }

    /// Invalidate every batch stamped so far, then clear the coordinator
    pub async fn reset_all(&self) -> Result<(), ServiceError> {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "reset epoch advanced");
        self.send(Command::ResetAll).await
    }

    pub async fn start_recording(&self) -> Result<bool, ServiceError> {
        self.request(Command::StartRecording).await
    }

    pub async fn stop_recording_and_export(&self) -> Result<String, ServiceError> {
        self.request(Command::StopAndExport).await
    }

    pub async fn export_dataset(&self) -> Result<String, ServiceError> {
        self.request(Command::Export).await
    }

    pub async fn stats(&self) -> Result<IngestStats, ServiceError> {
        self.request(Command::Stats).await
    }

    /// Fresh snapshot taken after every command queued before this call
    pub async fn snapshot(&self) -> Result<Snapshot, ServiceError> {
        self.request(Command::Snapshot).await
    }

    /// Most recently published snapshot, without a round trip
    pub fn latest_snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn ratio_history(&self) -> Vec<RatioSample> {
        self.ratio_history.read().to_vec()
    }

    pub fn counters(&self) -> Arc<AcquisitionCounters> {
        Arc::clone(&self.counters)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Join handles of the service tasks
pub struct ServiceTasks {
    pub ingest: JoinHandle<()>,
    pub stats: JoinHandle<()>,
}

impl ServiceTasks {
    /// Wait for both tasks; a panicked task is logged
    pub async fn join(self) {
        for (name, handle) in [("ingest", self.ingest), ("stats", self.stats)] {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "service task ended abnormally");
            }
        }
    }
}

pub struct IngestService;

impl IngestService {
    /// Spawn the ingestion and statistics tasks on the current runtime
    pub fn spawn(
        config: StreamConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(IngestHandle, ServiceTasks), ConfigError> {
        Self::spawn_with_token(config, clock, CancellationToken::new())
    }

    pub fn spawn_with_token(
        config: StreamConfig,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Result<(IngestHandle, ServiceTasks), ConfigError> {
        let coordinator = IngestCoordinator::new(config.clone(), Arc::clone(&clock))?;
        let counters = coordinator.counters();
        let epoch = Arc::new(AtomicU64::new(0));
        let ratio_history = Arc::new(RwLock::new(BoundedSeries::new(
            config.transport.stats_history_capacity,
        )));

        let (tx, rx) = mpsc::channel(config.transport.channel_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(coordinator.snapshot());

        let ingest = tokio::spawn(run_ingest(
            coordinator,
            rx,
            snapshot_tx,
            Arc::clone(&epoch),
            config.transport.tick_interval(),
            cancel.clone(),
        ));
        let stats = tokio::spawn(run_stats(
            AcquisitionMonitor::new(&config.acquisition),
            Arc::clone(&counters),
            Arc::clone(&ratio_history),
            clock,
            config.transport.stats_interval(),
            cancel.clone(),
        ));

        info!(
            channel_capacity = config.transport.channel_capacity,
            tick_ms = config.transport.tick_interval_ms,
            stats_ms = config.transport.stats_interval_ms,
            "ingest service started"
        );

        let handle = IngestHandle {
            tx,
            epoch,
            snapshots: snapshot_rx,
            ratio_history,
            counters,
            cancel,
        };
        Ok((handle, ServiceTasks { ingest, stats }))
    }
}

async fn run_ingest(
    mut coordinator: IngestCoordinator,
    mut rx: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<Snapshot>,
    epoch: Arc<AtomicU64>,
    tick: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stale_epoch_batches = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("ingestion task stopping");
                break;
            }
            command = rx.recv() => {
                let Some(command) = command else {
                    info!("all handles dropped, ingestion task stopping");
                    break;
                };
                apply(&mut coordinator, command, &epoch, &mut stale_epoch_batches);
            }
            _ = ticker.tick() => {
                if let Some(outcome) = coordinator.tick() {
                    info!(reference = ?outcome.reference, "calibration ended on schedule");
                }
                snapshot_tx.send_replace(coordinator.snapshot());
            }
        }
    }

    snapshot_tx.send_replace(coordinator.snapshot());
    if stale_epoch_batches > 0 {
        debug!(stale_epoch_batches, "batches discarded after resets");
    }
}

fn apply(coordinator: &mut IngestCoordinator, command: Command, epoch: &AtomicU64, stale: &mut u64) {
    match command {
        Command::Batch {
            epoch: batch_epoch,
            values,
            timestamp,
            interpolated,
        } => {
            if batch_epoch < epoch.load(Ordering::Acquire) {
                *stale += 1;
                coordinator.note_discarded(timestamp);
                return;
            }
            // rejections are logged and counted by the coordinator
            let _ = coordinator.ingest(&values, timestamp, interpolated);
        }
        Command::Connection(event, reply) => {
            let _ = reply.send(coordinator.on_connection_event(event));
        }
        Command::StartCalibration => coordinator.start_calibration(),
        Command::EndCalibration(reply) => {
            let _ = reply.send(coordinator.end_calibration());
        }
        Command::ResetAll => coordinator.reset_all(),
        Command::StartRecording(reply) => {
            let _ = reply.send(coordinator.start_recording());
        }
        Command::StopAndExport(reply) => {
            let _ = reply.send(coordinator.stop_recording_and_export());
        }
        Command::Export(reply) => {
            let _ = reply.send(coordinator.export_dataset());
        }
        Command::Stats(reply) => {
            let _ = reply.send(coordinator.stats());
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(coordinator.snapshot());
        }
    }
}

async fn run_stats(
    mut monitor: AcquisitionMonitor,
    counters: Arc<AcquisitionCounters>,
    history: Arc<RwLock<BoundedSeries<RatioSample>>>,
    clock: Arc<dyn Clock>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("statistics task stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Some(sample) = monitor.evaluate(&counters, clock.now_secs()) {
                    history.write().push(sample);
                }
            }
        }
    }
}
