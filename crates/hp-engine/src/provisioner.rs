//! Endpoint Provisioner - keeps every text channel topped up to the
//! desired number of webhooks.
//!
//! One pass:
//! - Lists channels, then the webhooks of each text channel
//! - Merges usable webhooks into the registry
//! - Computes the per-channel deficit
//! - Creates up to `create_burst` webhooks, starts spread evenly over the
//!   burst window; the rest is deferred to later passes
//! - Waits for every creation to settle, then persists the address list

use std::sync::Arc;
use std::time::{Duration, Instant};
use hp_common::{Channel, Endpoint};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::client::MessagingService;
use crate::engine_metrics;
use crate::error::EngineError;
use crate::persistence::{persist, AddressSink};
use crate::registry::{EndpointRegistry, Upsert};

/// Configuration for the provisioner
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub community_id: String,
    pub desired_per_channel: u32,
    /// Maximum creation starts per pass
    pub create_burst: u32,
    /// Window the creation starts are spread over
    pub burst_window: Duration,
    /// Name given to created webhooks
    pub endpoint_name: String,
    /// Base used to derive delivery addresses
    pub webhook_base_url: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            community_id: String::new(),
            desired_per_channel: 2,
            create_burst: 25,
            burst_window: Duration::from_millis(10_000),
            endpoint_name: "autowebhook".to_string(),
            webhook_base_url: "https://discord.com/api/webhooks".to_string(),
        }
    }
}

/// Endpoints still needed on one channel
#[derive(Debug, Clone)]
pub struct ChannelDeficit {
    pub channel: Channel,
    pub missing: usize,
}

/// Creation schedule for one pass
#[derive(Debug, Clone, PartialEq)]
pub struct BurstPlan {
    pub total_missing: usize,
    pub starts: usize,
    /// Delay between consecutive starts
    pub spacing: Duration,
    /// Missing endpoints left for later passes
    pub deferred: usize,
    /// One channel per creation start, in channel order
    pub tasks: Vec<Channel>,
}

impl BurstPlan {
    pub fn compute(deficits: &[ChannelDeficit], create_burst: u32, burst_window: Duration) -> Self {
        let total_missing: usize = deficits.iter().map(|d| d.missing).sum();
        let starts = total_missing.min(create_burst as usize);

        let spacing = if starts == 0 {
            Duration::ZERO
        } else {
            let window_ms = burst_window.as_millis() as u64;
            Duration::from_millis((window_ms / starts as u64).max(1))
        };

        let tasks: Vec<Channel> = deficits
            .iter()
            .flat_map(|d| std::iter::repeat(&d.channel).take(d.missing))
            .take(starts)
            .cloned()
            .collect();

        Self {
            total_missing,
            starts,
            spacing,
            deferred: total_missing - starts,
            tasks,
        }
    }

    /// Delay before the `index`-th start
    pub fn delay_for(&self, index: usize) -> Duration {
        self.spacing * index as u32
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Text channels looked at
    pub channels_scanned: usize,
    /// Text channels whose webhook listing failed
    pub channels_skipped: usize,
    /// Webhooks newly added to the registry by discovery
    pub discovered: usize,
    pub total_missing: usize,
    pub scheduled: usize,
    pub created: usize,
    pub failed: usize,
    pub deferred: usize,
}

pub struct Provisioner {
    service: Arc<dyn MessagingService>,
    registry: Arc<EndpointRegistry>,
    sink: Arc<dyn AddressSink>,
    config: ProvisionerConfig,
}

impl Provisioner {
    pub fn new(
        service: Arc<dyn MessagingService>,
        registry: Arc<EndpointRegistry>,
        sink: Arc<dyn AddressSink>,
        config: ProvisionerConfig,
    ) -> Self {
        Self { service, registry, sink, config }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Run one pass. Only a failure to list the community's channels is an
    /// error; per-channel and per-creation failures are counted in the report.
    pub async fn reconcile(&self) -> Result<PassReport, EngineError> {
        let started = Instant::now();
        let channels = self.service.list_channels(&self.config.community_id).await?;

        let mut report = PassReport::default();
        let deficits = self.discover(channels, &mut report).await;

        let plan = BurstPlan::compute(&deficits, self.config.create_burst, self.config.burst_window);
        report.total_missing = plan.total_missing;
        report.deferred = plan.deferred;

        if plan.tasks.is_empty() {
            persist(self.sink.as_ref(), &self.registry).await;
            self.finish(&report, started);
            return Ok(report);
        }

        info!(
            total_missing = plan.total_missing,
            starts = plan.starts,
            window_ms = self.config.burst_window.as_millis() as u64,
            spacing_ms = plan.spacing.as_millis() as u64,
            deferred = plan.deferred,
            "Scheduling webhook creation burst"
        );

        let (created, failed) = self.run_burst(&plan).await;
        report.scheduled = plan.starts;
        report.created = created;
        report.failed = failed;

        persist(self.sink.as_ref(), &self.registry).await;
        self.finish(&report, started);
        Ok(report)
    }

    /// Merge discovered webhooks and compute per-channel deficits.
    async fn discover(&self, channels: Vec<Channel>, report: &mut PassReport) -> Vec<ChannelDeficit> {
        let desired = self.config.desired_per_channel as usize;
        let mut deficits = Vec::new();

        for channel in channels.into_iter().filter(|c| c.kind.is_message_capable()) {
            report.channels_scanned += 1;

            let remote = match self.service.list_endpoints(&channel).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(
                        channel_id = %channel.id,
                        channel = %channel.name,
                        error = %e,
                        "Failed fetching webhooks for channel, skipping"
                    );
                    report.channels_skipped += 1;
                    continue;
                }
            };

            let mut existing = 0;
            for endpoint in remote
                .into_iter()
                .filter_map(|r| Endpoint::from_remote(r, &self.config.webhook_base_url))
            {
                existing += 1;
                if self.registry.upsert(endpoint) == Upsert::Inserted {
                    report.discovered += 1;
                }
            }

            let missing = desired.saturating_sub(existing);
            debug!(
                channel_id = %channel.id,
                existing = existing,
                missing = missing,
                "Channel scanned"
            );
            if missing > 0 {
                deficits.push(ChannelDeficit { channel, missing });
            }
        }

        deficits
    }

    /// Launch the staggered creation tasks and wait for all of them.
    /// Returns (created, failed).
    async fn run_burst(&self, plan: &BurstPlan) -> (usize, usize) {
        let mut tasks = JoinSet::new();

        for (index, channel) in plan.tasks.iter().cloned().enumerate() {
            let delay = plan.delay_for(index);
            let service = self.service.clone();
            let registry = self.registry.clone();
            let name = self.config.endpoint_name.clone();
            let base = self.config.webhook_base_url.clone();

            let span = info_span!("create_webhook", channel_id = %channel.id, slot = index);

            tasks.spawn(async move {
                tokio::time::sleep(delay).await;
                create_one(service.as_ref(), &registry, &channel, &name, &base).await
            }.instrument(span));
        }

        let mut created = 0;
        let mut failed = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => created += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!(error = %e, "Webhook creation task aborted");
                    engine_metrics::record_endpoint_creation_failed();
                    failed += 1;
                }
            }
        }
        (created, failed)
    }

    fn finish(&self, report: &PassReport, started: Instant) {
        engine_metrics::set_registry_size(self.registry.len());
        engine_metrics::record_pass(started.elapsed(), report.deferred);
        info!(
            channels = report.channels_scanned,
            skipped = report.channels_skipped,
            discovered = report.discovered,
            missing = report.total_missing,
            created = report.created,
            failed = report.failed,
            deferred = report.deferred,
            registry_size = self.registry.len(),
            "Reconciliation pass complete"
        );
    }
}

/// Create one webhook and register it. Failures are logged and dropped; the
/// deficit persists, so the next pass retries.
async fn create_one(
    service: &dyn MessagingService,
    registry: &EndpointRegistry,
    channel: &Channel,
    name: &str,
    webhook_base: &str,
) -> bool {
    match service.create_endpoint(channel, name).await {
        Ok(remote) => {
            let id = remote.id.clone();
            match Endpoint::from_remote(remote, webhook_base) {
                Some(endpoint) => {
                    registry.upsert(endpoint);
                    engine_metrics::record_endpoint_created();
                    info!(channel = %channel.name, channel_id = %channel.id, webhook_id = %id, "Created webhook");
                    true
                }
                None => {
                    warn!(channel_id = %channel.id, webhook_id = %id, "Created webhook has no token, ignoring");
                    engine_metrics::record_endpoint_creation_failed();
                    false
                }
            }
        }
        Err(e) => {
            warn!(channel_id = %channel.id, error = %e, "Cannot create webhook in channel");
            engine_metrics::record_endpoint_creation_failed();
            false
        }
    }
}
