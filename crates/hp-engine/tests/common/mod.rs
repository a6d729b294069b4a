//! Shared test doubles: an in-memory messaging service and a recording sink.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hp_common::{Channel, DeliveryResponse, RemoteEndpoint};
use hp_engine::{
    AddressSink, EngineError, Identity, MessagingService, ProvisionerConfig, ServiceError,
    ServiceResult,
};
use parking_lot::Mutex;
use tokio::time::Instant;

pub const WEBHOOK_BASE: &str = "https://hooks.test/webhooks";
pub const COMMUNITY: &str = "guild-1";

#[derive(Debug, Clone)]
pub struct Delivery {
    pub address: String,
    pub body: String,
    pub at: Instant,
}

/// In-memory messaging service. Created webhooks show up in later listings.
#[derive(Default)]
pub struct MockService {
    channels: Mutex<Vec<Channel>>,
    endpoints: Mutex<HashMap<String, Vec<RemoteEndpoint>>>,
    failing_channels: Mutex<HashSet<String>>,
    responses: Mutex<VecDeque<DeliveryResponse>>,
    community_missing: AtomicBool,
    create_fails: AtomicBool,
    panic_on_deliver: AtomicBool,
    next_id: AtomicU32,
    pub list_channel_calls: AtomicU32,
    pub list_endpoint_calls: AtomicU32,
    creations: Mutex<Vec<(String, Instant)>>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(channels: Vec<Channel>) -> Self {
        let service = Self::default();
        *service.channels.lock() = channels;
        service
    }

    pub fn add_remote(&self, remote: RemoteEndpoint) {
        self.endpoints
            .lock()
            .entry(remote.channel_id.clone())
            .or_default()
            .push(remote);
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels.lock().insert(channel_id.to_string());
    }

    pub fn set_community_missing(&self, missing: bool) {
        self.community_missing.store(missing, Ordering::SeqCst);
    }

    pub fn set_create_fails(&self, fails: bool) {
        self.create_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_panic_on_deliver(&self, panic: bool) {
        self.panic_on_deliver.store(panic, Ordering::SeqCst);
    }

    /// Queue a scripted delivery response; an empty queue answers 204.
    pub fn push_response(&self, response: DeliveryResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn creation_count(&self) -> usize {
        self.creations.lock().len()
    }

    /// Creation instants in ascending order
    pub fn creation_times(&self) -> Vec<Instant> {
        let mut times: Vec<Instant> = self.creations.lock().iter().map(|(_, at)| *at).collect();
        times.sort();
        times
    }

    pub fn created_in(&self, channel_id: &str) -> usize {
        self.creations.lock().iter().filter(|(c, _)| c == channel_id).count()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }
}

#[async_trait]
impl MessagingService for MockService {
    async fn current_identity(&self) -> ServiceResult<Identity> {
        Ok(Identity {
            id: "1".to_string(),
            username: "mockbot".to_string(),
        })
    }

    async fn list_channels(&self, community_id: &str) -> ServiceResult<Vec<Channel>> {
        self.list_channel_calls.fetch_add(1, Ordering::SeqCst);
        if self.community_missing.load(Ordering::SeqCst) {
            return Err(ServiceError::CommunityUnavailable(community_id.to_string()));
        }
        Ok(self.channels.lock().clone())
    }

    async fn list_endpoints(&self, channel: &Channel) -> ServiceResult<Vec<RemoteEndpoint>> {
        self.list_endpoint_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_channels.lock().contains(&channel.id) {
            return Err(ServiceError::UnexpectedStatus {
                status: 500,
                context: format!("channel {} webhooks", channel.id),
            });
        }
        Ok(self.endpoints.lock().get(&channel.id).cloned().unwrap_or_default())
    }

    async fn create_endpoint(&self, channel: &Channel, name: &str) -> ServiceResult<RemoteEndpoint> {
        if self.create_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::PermissionDenied(format!("channel {}", channel.id)));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let remote = RemoteEndpoint {
            id: format!("hook-{}", n),
            secret: Some(format!("secret-{}", n)),
            channel_id: channel.id.clone(),
            name: Some(name.to_string()),
        };
        self.add_remote(remote.clone());
        self.creations.lock().push((channel.id.clone(), Instant::now()));
        Ok(remote)
    }

    async fn deliver(&self, address: &str, body: &str) -> ServiceResult<DeliveryResponse> {
        if self.panic_on_deliver.load(Ordering::SeqCst) {
            panic!("mock delivery panic");
        }

        self.deliveries.lock().push(Delivery {
            address: address.to_string(),
            body: body.to_string(),
            at: Instant::now(),
        });
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| DeliveryResponse::new(204)))
    }
}

/// Sink that records every save attempt
#[derive(Default)]
pub struct RecordingSink {
    saves: Mutex<Vec<Vec<String>>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().len()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.saves.lock().last().cloned()
    }
}

#[async_trait]
impl AddressSink for RecordingSink {
    async fn save(&self, addresses: &[String]) -> Result<(), EngineError> {
        self.saves.lock().push(addresses.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Persistence(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

pub fn remote(id: &str, secret: Option<&str>, channel_id: &str) -> RemoteEndpoint {
    RemoteEndpoint {
        id: id.to_string(),
        secret: secret.map(str::to_string),
        channel_id: channel_id.to_string(),
        name: None,
    }
}

pub fn provisioner_config(desired_per_channel: u32) -> ProvisionerConfig {
    ProvisionerConfig {
        community_id: COMMUNITY.to_string(),
        desired_per_channel,
        create_burst: 25,
        burst_window: Duration::from_millis(10_000),
        endpoint_name: "autowebhook".to_string(),
        webhook_base_url: WEBHOOK_BASE.to_string(),
    }
}

/// Poll `check` every 10 ms until it holds or `limit` elapses.
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
