//! Reconciliation Driver - periodic background task
//!
//! Each tick runs a provisioner pass (which persists), then launches a
//! dispatch loop for every registry entry that lacks one. Pass failures and
//! panics are logged and the driver keeps ticking.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::provisioner::{PassReport, Provisioner};
use crate::supervisor::LoopSupervisor;

/// Configuration for the reconciliation driver
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Interval between passes; the first pass runs immediately
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
        }
    }
}

/// Outcome of one driver tick
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    /// `None` when the pass was aborted
    pub report: Option<PassReport>,
    pub launched: usize,
}

pub struct Reconciler {
    provisioner: Arc<Provisioner>,
    supervisor: Arc<LoopSupervisor>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        provisioner: Arc<Provisioner>,
        supervisor: Arc<LoopSupervisor>,
        config: ReconcilerConfig,
    ) -> Self {
        let mut config = config;
        if config.interval.is_zero() {
            warn!("Zero reconciliation interval, using 1 ms");
            config.interval = Duration::from_millis(1);
        }
        Self { provisioner, supervisor, config }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Provision, then launch loops. Loops are launched even when the pass
    /// aborts, so already-known webhooks keep sending.
    pub async fn tick(&self) -> TickSummary {
        let report = match self.provisioner.reconcile().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Reconciliation pass aborted, retrying next tick");
                None
            }
        };

        let launched = self.supervisor.launch_pending();
        TickSummary { report, launched }
    }

    /// Spawn the periodic driver. It stops when `shutdown_tx` fires.
    pub fn spawn(self: Arc<Self>, shutdown_tx: &broadcast::Sender<()>) -> tokio::task::JoinHandle<()> {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let interval = self.config.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_ms = interval.as_millis() as u64, "Reconciliation driver started");

            let mut pass: u64 = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("Reconciliation driver shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        pass += 1;
                        let span = info_span!("reconcile_pass", pass = pass);
                        let tick = AssertUnwindSafe(self.tick()).catch_unwind().instrument(span);
                        match tick.await {
                            Ok(summary) => {
                                debug!(launched = summary.launched, "Reconciliation tick complete");
                            }
                            Err(_) => error!("Reconciliation tick panicked"),
                        }
                    }
                }
            }
        })
    }
}
