//! Delivery of sampled snapshots to the collector.
//!
//! On every report tick the [`Dispatcher`] takes the most recent snapshot, encodes each
//! field of the static field table as its own payload and drains the payloads through a
//! bounded pool of concurrent senders. Delivery is best effort: failures are logged and
//! dropped, nothing is carried over to the next tick.

pub mod payload;
pub mod transport;

pub use payload::{encode, EncodedPayload};
pub use transport::{HttpTransport, Transport};

use crate::core::Signer;
use crate::metrics::{MetricSnapshot, FIELDS};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Outcome of delivering one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Fields for which a send was attempted or encoding failed.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Fans snapshot fields out over a bounded pool of senders.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    signer: Option<Signer>,
    workers: usize,
    report_interval: Duration,
}

impl Dispatcher {
    /// `workers` concurrent senders plus one are used per tick.
    pub fn new(
        transport: Arc<dyn Transport>,
        signer: Option<Signer>,
        workers: usize,
        report_interval: Duration,
    ) -> Self {
        Self {
            transport,
            signer,
            workers,
            report_interval,
        }
    }

    /// Number of concurrent senders per tick.
    pub fn pool_size(&self) -> usize {
        self.workers + 1
    }

    /// Delivers every field of `snapshot` once.
    ///
    /// A failing field never affects its siblings. After `cancel` fires, senders finish
    /// their in-flight request but take no further work.
    pub async fn deliver(&self, snapshot: &MetricSnapshot, cancel: &CancellationToken) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let (jobs_tx, jobs_rx) = mpsc::channel(FIELDS.len().max(1));
        for (name, value) in snapshot.fields() {
            match payload::encode(name, value, self.signer.as_ref()) {
                Ok(payload) => {
                    // The channel is sized for every field, so this never waits.
                    if jobs_tx.send(payload).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(metric = name, "Failed to encode payload: {}", e);
                    report.attempted += 1;
                    report.failed += 1;
                }
            }
        }
        drop(jobs_tx);

        let jobs = Arc::new(Mutex::new(jobs_rx));
        let senders = (0..self.pool_size()).map(|worker| {
            let jobs = Arc::clone(&jobs);
            let transport = Arc::clone(&self.transport);
            let cancel = cancel.clone();
            tokio::spawn(async move { drain(worker, &jobs, transport.as_ref(), &cancel).await })
        });

        for result in join_all(senders).await {
            match result {
                Ok(worker_report) => {
                    report.attempted += worker_report.attempted;
                    report.delivered += worker_report.delivered;
                    report.failed += worker_report.failed;
                }
                Err(e) => tracing::error!("Sender task failed: {}", e),
            }
        }

        report
    }

    /// Runs one delivery per report tick until `cancel` fires.
    pub async fn run(self, mut snapshots: mpsc::Receiver<MetricSnapshot>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut latest = tokio::select! {
                () = cancel.cancelled() => break,
                snapshot = snapshots.recv() => match snapshot {
                    Some(snapshot) => snapshot,
                    None => {
                        tracing::debug!("Snapshot producer gone, stopping dispatcher");
                        break;
                    }
                },
            };
            while let Ok(newer) = snapshots.try_recv() {
                latest = newer;
            }

            let report = self.deliver(&latest, &cancel).await;
            tracing::info!(
                poll_count = latest.poll_count,
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "Snapshot delivered"
            );
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Spawns [`Dispatcher::run`] on the runtime.
    pub fn spawn(
        self,
        snapshots: mpsc::Receiver<MetricSnapshot>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(snapshots, cancel))
    }
}

async fn drain(
    worker: usize,
    jobs: &Mutex<mpsc::Receiver<EncodedPayload>>,
    transport: &dyn Transport,
    cancel: &CancellationToken,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    while !cancel.is_cancelled() {
        let next = jobs.lock().await.recv().await;
        let Some(payload) = next else {
            break;
        };

        report.attempted += 1;
        match transport.send(&payload).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(worker, metric = %payload.name, "Failed to deliver metric: {}", e);
            }
        }
    }

    report
}
