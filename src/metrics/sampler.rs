//! Periodic snapshot producer.

use super::MetricSnapshot;
use chrono::Utc;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Captures process and host statistics into [`MetricSnapshot`]s.
pub struct Sampler {
    // sysinfo computes CPU usage from the difference between two refreshes, so a single
    // instance is kept for the lifetime of the sampler.
    system: System,
    pid: Option<Pid>,
    poll_count: i64,
}

impl Sampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Process statistics unavailable: {}", e);
                None
            }
        };

        Self {
            system: System::new(),
            pid,
            poll_count: 0,
        }
    }

    /// Number of snapshots taken so far.
    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }

    /// Takes one snapshot, advancing the poll counter.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&mut self) -> MetricSnapshot {
        self.poll_count += 1;

        self.system.refresh_memory();
        self.system.refresh_cpu_usage();
        if let Some(pid) = self.pid {
            self.system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        }

        let mut snapshot = MetricSnapshot {
            total_memory: self.system.total_memory() as f64,
            free_memory: self.system.free_memory() as f64,
            available_memory: self.system.available_memory() as f64,
            used_memory: self.system.used_memory() as f64,
            total_swap: self.system.total_swap() as f64,
            free_swap: self.system.free_swap() as f64,
            load_average1: finite_or_zero(System::load_average().one),
            cpu_utilization1: finite_or_zero(f64::from(self.system.global_cpu_usage())),
            poll_count: self.poll_count,
            random_value: rand::random::<f64>(),
            sampled_at: Utc::now(),
            ..MetricSnapshot::default()
        };

        if let Some(process) = self.pid.and_then(|pid| self.system.process(pid)) {
            let disk = process.disk_usage();
            snapshot.alloc = process.memory() as f64;
            snapshot.virtual_memory = process.virtual_memory() as f64;
            snapshot.process_cpu = finite_or_zero(f64::from(process.cpu_usage()));
            snapshot.run_time = process.run_time() as f64;
            snapshot.disk_read_bytes = disk.total_read_bytes as f64;
            snapshot.disk_written_bytes = disk.total_written_bytes as f64;
        }

        snapshot
    }

    /// Samples every `period` until `cancel` fires.
    ///
    /// The first snapshot is taken one full period after the start. Handing a snapshot
    /// over waits for room in the channel, so a snapshot is never dropped once taken.
    pub fn spawn(
        mut self,
        period: Duration,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<MetricSnapshot>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = self.sample();
                tracing::trace!(poll_count = snapshot.poll_count, "Snapshot taken");

                tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = tx.send(snapshot) => {
                        if sent.is_err() {
                            tracing::debug!("Snapshot consumer gone, stopping sampler");
                            break;
                        }
                    }
                }
            }

            tracing::info!(polls = self.poll_count, "Sampler stopped");
        });

        (rx, handle)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

// CPU usage has no previous refresh to diff against on some platforms and comes back NaN.
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
