//! Engine - wires the registry, provisioner, supervisor and driver together

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::MessagingService;
use crate::dispatch::{DispatchContext, Pacing};
use crate::messages::MessagePool;
use crate::persistence::AddressSink;
use crate::provisioner::{Provisioner, ProvisionerConfig};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::registry::EndpointRegistry;
use crate::supervisor::LoopSupervisor;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub provisioner: ProvisionerConfig,
    pub reconciler: ReconcilerConfig,
    pub pacing: Pacing,
    /// Time loops get to finish after shutdown is signalled
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provisioner: ProvisionerConfig::default(),
            reconciler: ReconcilerConfig::default(),
            pacing: Pacing::default(),
            shutdown_grace: Duration::from_millis(300),
        }
    }
}

pub struct Engine {
    registry: Arc<EndpointRegistry>,
    supervisor: Arc<LoopSupervisor>,
    reconciler: Arc<Reconciler>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_grace: Duration,
}

impl Engine {
    pub fn new(
        service: Arc<dyn MessagingService>,
        sink: Arc<dyn AddressSink>,
        messages: Arc<MessagePool>,
        config: EngineConfig,
    ) -> Self {
        let registry = Arc::new(EndpointRegistry::new());

        let provisioner = Arc::new(Provisioner::new(
            service.clone(),
            registry.clone(),
            sink.clone(),
            config.provisioner,
        ));

        let supervisor = Arc::new(LoopSupervisor::new(DispatchContext {
            service,
            registry: registry.clone(),
            sink,
            messages,
            pacing: config.pacing,
        }));

        let reconciler = Arc::new(Reconciler::new(
            provisioner,
            supervisor.clone(),
            config.reconciler,
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            registry,
            supervisor,
            reconciler,
            shutdown_tx,
            shutdown_grace: config.shutdown_grace,
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &Arc<LoopSupervisor> {
        &self.supervisor
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Spawn the reconciliation driver
    pub fn start(&self) -> JoinHandle<()> {
        self.reconciler.clone().spawn(&self.shutdown_tx)
    }

    /// Stop the driver, then the dispatch loops. A driver still inside a
    /// pass after the grace period is aborted.
    pub async fn shutdown(&self, mut driver: JoinHandle<()>) {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.shutdown_grace, &mut driver).await {
            Ok(_) => info!("Reconciliation driver stopped"),
            Err(_) => {
                warn!("Reconciliation driver still running after grace period, aborting");
                driver.abort();
                let _ = driver.await;
            }
        }

        self.supervisor.shutdown(self.shutdown_grace).await;
    }
}
