//! LoopSupervisor - owns the table of running dispatch loops
//!
//! - Launches a loop for every registry entry without one, claiming the
//!   entry first so a loop is started exactly once
//! - Tracks each loop's task handle keyed by address; a loop drops its own
//!   handle when it ends
//! - Releases the claim of a loop that panicked so a later pass can
//!   relaunch it
//! - Shuts loops down cooperatively with a grace period, then aborts

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use hp_common::redact_address;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dispatch::{DispatchContext, DispatchLoop, LoopExit};
use crate::engine_metrics;

pub struct LoopSupervisor {
    ctx: DispatchContext,
    tasks: Arc<DashMap<String, JoinHandle<LoopExit>>>,
    stop_tx: watch::Sender<bool>,
}

impl LoopSupervisor {
    pub fn new(ctx: DispatchContext) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            ctx,
            tasks: Arc::new(DashMap::new()),
            stop_tx,
        }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.ctx
    }

    /// Start a loop for every unclaimed registry entry. Returns how many
    /// loops were launched.
    pub fn launch_pending(&self) -> usize {
        if self.is_stopping() {
            return 0;
        }

        let registry = &self.ctx.registry;
        let mut launched = 0;

        for endpoint in registry.entries_without_running_loop() {
            if !registry.try_claim(&endpoint.address) {
                continue;
            }
            if self.spawn_loop(endpoint.address) {
                launched += 1;
            }
        }

        if launched > 0 {
            debug!(launched = launched, active = self.tasks.len(), "Launched dispatch loops");
        }
        engine_metrics::set_active_loops(self.tasks.len());
        launched
    }

    fn spawn_loop(&self, address: String) -> bool {
        match self.tasks.entry(address.clone()) {
            Entry::Occupied(_) => {
                // Previous loop for this address has not unwound yet
                warn!(address = %redact_address(&address), "Dispatch loop still registered, retrying next pass");
                self.ctx.registry.release(&address);
                false
            }
            Entry::Vacant(slot) => {
                let dispatch = DispatchLoop::new(address.clone(), self.ctx.clone(), self.stop_tx.subscribe());
                let registry = self.ctx.registry.clone();
                let tasks = self.tasks.clone();

                let span = info_span!("dispatch_loop", address = %redact_address(&address));

                let handle = tokio::spawn(async move {
                    let exit = match AssertUnwindSafe(dispatch.run()).catch_unwind().await {
                        Ok(exit) => exit,
                        Err(_) => LoopExit::Crashed,
                    };

                    tasks.remove(&address);
                    if exit == LoopExit::Crashed {
                        let released = registry.release(&address);
                        error!(
                            address = %redact_address(&address),
                            released = released,
                            "Dispatch loop crashed"
                        );
                    }
                    engine_metrics::set_active_loops(tasks.len());
                    exit
                }.instrument(span));

                slot.insert(handle);
                true
            }
        }
    }

    pub fn active_loops(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self, address: &str) -> bool {
        self.tasks.contains_key(address)
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Ask every loop to stop before its next send, wait up to `grace` for
    /// them to finish, then abort the stragglers. Returns the number aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.stop_tx.send_replace(true);

        let addresses: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<(String, JoinHandle<LoopExit>)> = addresses
            .into_iter()
            .filter_map(|address| self.tasks.remove(&address))
            .collect();

        info!(loops = handles.len(), grace_ms = grace.as_millis() as u64, "Stopping dispatch loops");

        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = 0;
        for (address, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(exit)) => debug!(address = %redact_address(&address), exit = ?exit, "Dispatch loop stopped"),
                Ok(Err(e)) => warn!(address = %redact_address(&address), error = %e, "Dispatch loop join failed"),
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        if aborted > 0 {
            warn!(aborted = aborted, "Dispatch loops aborted after grace period");
        }
        engine_metrics::set_active_loops(0);
        aborted
    }
}
