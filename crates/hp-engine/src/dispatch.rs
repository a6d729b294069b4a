//! Dispatch Loop - the per-webhook send cycle
//!
//! Each loop repeatedly picks a body, delivers it, and reacts to the
//! classified outcome:
//! - 401/404: the webhook is gone; remove it, persist, stop
//! - 429: wait out the retry hint, then continue
//! - anything else: keep going
//!
//! Between sends the loop sleeps a random duration within the pacing range
//! so the pool does not fire in lockstep.

use std::sync::Arc;
use std::time::Duration;
use hp_common::{redact_address, DeliveryOutcome};
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::MessagingService;
use crate::engine_metrics;
use crate::messages::MessagePool;
use crate::persistence::{persist, AddressSink};
use crate::registry::EndpointRegistry;

/// Random delay range between two sends of the same loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    /// An inverted range collapses to `min`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max: max.max(min) }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Uniform random delay in `[min, max]` at millisecond resolution
    pub fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(Duration::from_millis(300), Duration::from_millis(800))
    }
}

/// Loop lifecycle. `Stopped` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Sending,
    Stopped,
    Cancelled,
}

/// Why a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Webhook rejected permanently; entry removed from the registry
    Stopped { status: u16 },
    /// Shutdown requested
    Cancelled,
    /// The loop panicked; set by the supervisor
    Crashed,
}

/// Collaborators shared by every dispatch loop
#[derive(Clone)]
pub struct DispatchContext {
    pub service: Arc<dyn MessagingService>,
    pub registry: Arc<EndpointRegistry>,
    pub sink: Arc<dyn AddressSink>,
    pub messages: Arc<MessagePool>,
    pub pacing: Pacing,
}

pub struct DispatchLoop {
    address: String,
    ctx: DispatchContext,
    stop_rx: watch::Receiver<bool>,
    state: LoopState,
}

impl DispatchLoop {
    pub fn new(address: String, ctx: DispatchContext, stop_rx: watch::Receiver<bool>) -> Self {
        Self {
            address,
            ctx,
            stop_rx,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run until the webhook becomes invalid or shutdown is requested.
    pub async fn run(mut self) -> LoopExit {
        info!(address = %redact_address(&self.address), "Dispatch loop started");
        loop {
            if let Some(exit) = self.step().await {
                info!(address = %redact_address(&self.address), exit = ?exit, "Dispatch loop ended");
                return exit;
            }
        }
    }

    /// One iteration: stop check, send, react, pace. Returns the exit reason
    /// once a terminal state is reached.
    pub async fn step(&mut self) -> Option<LoopExit> {
        if self.stopping() {
            self.state = LoopState::Cancelled;
            return Some(LoopExit::Cancelled);
        }

        let body = self.ctx.messages.pick().to_string();

        self.state = LoopState::Sending;
        let outcome = match self.ctx.service.deliver(&self.address, &body).await {
            Ok(response) => response.classify(),
            Err(e) => DeliveryOutcome::Transient {
                status: None,
                reason: e.to_string(),
            },
        };
        self.state = LoopState::Running;
        engine_metrics::record_delivery(outcome.label());

        match outcome {
            DeliveryOutcome::Invalid { status } => {
                warn!(
                    address = %redact_address(&self.address),
                    status = status,
                    "Webhook invalid, removing"
                );
                self.ctx.registry.remove(&self.address);
                engine_metrics::record_endpoint_removed(status);
                persist(self.ctx.sink.as_ref(), &self.ctx.registry).await;
                self.state = LoopState::Stopped;
                return Some(LoopExit::Stopped { status });
            }
            DeliveryOutcome::RateLimited { wait } => {
                warn!(
                    address = %redact_address(&self.address),
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited on webhook, waiting"
                );
                engine_metrics::record_rate_limit_wait(wait);
                tokio::time::sleep(wait).await;
            }
            DeliveryOutcome::Delivered { status } => {
                debug!(
                    address = %redact_address(&self.address),
                    status = status,
                    body_len = body.len(),
                    "Sent via webhook"
                );
            }
            DeliveryOutcome::Transient { status, reason } => {
                warn!(
                    address = %redact_address(&self.address),
                    status = ?status,
                    reason = %reason,
                    "Webhook delivery failed"
                );
            }
        }

        let delay = self.ctx.pacing.next_delay();
        self.pause(delay).await;
        None
    }

    /// A dropped stop sender counts as a stop request.
    fn stopping(&self) -> bool {
        *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err()
    }

    /// Pacing sleep, cut short when shutdown is signalled.
    async fn pause(&mut self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.stop_rx.changed() => {}
        }
    }
}
