//! Hookpool Configuration System
//!
//! JSON (`config.json`) or TOML configuration with environment variable
//! override support. Field names are camelCase in both formats.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;
mod numeric;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found (searched: {0})")]
    NotFound(String),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

const DEFAULT_WEBHOOKS_FILE: &str = "webhooks.txt";
const DEFAULT_MESSAGES_FILE: &str = "messages.txt";
const DEFAULT_SCAN_EVERY_MS: u64 = 5000;
const DEFAULT_DESIRED_PER_CHANNEL: u32 = 2;
const DEFAULT_SEND_DELAY_MIN: u64 = 300;
const DEFAULT_SEND_DELAY_MAX: u64 = 800;
const DEFAULT_WEBHOOK_NAME: &str = "autowebhook";
const DEFAULT_CREATE_BURST: u32 = 25;
const DEFAULT_BURST_WINDOW_MS: u64 = 10_000;
const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";
const DEFAULT_WEBHOOK_BASE_URL: &str = "https://discord.com/api/webhooks";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 300;

/// Root application configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Bot token presented to the messaging service
    pub token: String,
    /// Community (guild) whose channels are provisioned
    #[serde(alias = "guildId")]
    pub community_id: String,

    /// Output file listing every known webhook address
    pub webhooks_file: String,
    /// Blank-line separated message bodies
    pub messages_file: String,

    /// Reconciliation interval
    #[serde(deserialize_with = "numeric::lenient")]
    pub scan_every_ms: u64,
    #[serde(deserialize_with = "numeric::lenient")]
    pub desired_per_channel: u32,
    #[serde(deserialize_with = "numeric::lenient")]
    pub send_delay_min: u64,
    #[serde(deserialize_with = "numeric::lenient")]
    pub send_delay_max: u64,
    /// Name given to created webhooks
    pub webhook_name: String,
    /// Max creation starts per reconciliation pass
    #[serde(deserialize_with = "numeric::lenient")]
    pub create_burst: u32,
    /// Window over which creation starts are spread
    #[serde(deserialize_with = "numeric::lenient")]
    pub burst_window_ms: u64,

    pub api_base_url: String,
    pub webhook_base_url: String,
    #[serde(deserialize_with = "numeric::lenient")]
    pub request_timeout_ms: u64,
    #[serde(deserialize_with = "numeric::lenient")]
    pub shutdown_grace_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            community_id: String::new(),
            webhooks_file: DEFAULT_WEBHOOKS_FILE.to_string(),
            messages_file: DEFAULT_MESSAGES_FILE.to_string(),
            scan_every_ms: DEFAULT_SCAN_EVERY_MS,
            desired_per_channel: DEFAULT_DESIRED_PER_CHANNEL,
            send_delay_min: DEFAULT_SEND_DELAY_MIN,
            send_delay_max: DEFAULT_SEND_DELAY_MAX,
            webhook_name: DEFAULT_WEBHOOK_NAME.to_string(),
            create_burst: DEFAULT_CREATE_BURST,
            burst_window_ms: DEFAULT_BURST_WINDOW_MS,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            webhook_base_url: DEFAULT_WEBHOOK_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

// The token is a credential; keep it out of `{:?}` output.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("community_id", &self.community_id)
            .field("webhooks_file", &self.webhooks_file)
            .field("messages_file", &self.messages_file)
            .field("scan_every_ms", &self.scan_every_ms)
            .field("desired_per_channel", &self.desired_per_channel)
            .field("send_delay_min", &self.send_delay_min)
            .field("send_delay_max", &self.send_delay_max)
            .field("webhook_name", &self.webhook_name)
            .field("create_burst", &self.create_burst)
            .field("burst_window_ms", &self.burst_window_ms)
            .field("api_base_url", &self.api_base_url)
            .field("webhook_base_url", &self.webhook_base_url)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("shutdown_grace_ms", &self.shutdown_grace_ms)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a file. Files ending in `.json` are parsed as
    /// JSON, everything else as TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config: AppConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Replace unset (zero/empty) values with defaults and repair an
    /// inverted send delay range.
    pub fn normalize(&mut self) {
        fn or_default<T: PartialEq + Default>(value: &mut T, default: T) {
            if *value == T::default() {
                *value = default;
            }
        }

        or_default(&mut self.webhooks_file, DEFAULT_WEBHOOKS_FILE.to_string());
        or_default(&mut self.messages_file, DEFAULT_MESSAGES_FILE.to_string());
        or_default(&mut self.scan_every_ms, DEFAULT_SCAN_EVERY_MS);
        or_default(&mut self.desired_per_channel, DEFAULT_DESIRED_PER_CHANNEL);
        or_default(&mut self.send_delay_min, DEFAULT_SEND_DELAY_MIN);
        or_default(&mut self.send_delay_max, DEFAULT_SEND_DELAY_MAX);
        or_default(&mut self.webhook_name, DEFAULT_WEBHOOK_NAME.to_string());
        or_default(&mut self.create_burst, DEFAULT_CREATE_BURST);
        or_default(&mut self.burst_window_ms, DEFAULT_BURST_WINDOW_MS);
        or_default(&mut self.api_base_url, DEFAULT_API_BASE_URL.to_string());
        or_default(&mut self.webhook_base_url, DEFAULT_WEBHOOK_BASE_URL.to_string());
        or_default(&mut self.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        or_default(&mut self.shutdown_grace_ms, DEFAULT_SHUTDOWN_GRACE_MS);

        if self.send_delay_max < self.send_delay_min {
            self.send_delay_max = self.send_delay_min;
        }
    }

    /// Check the settings startup cannot proceed without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::ValidationError("token must be set".to_string()));
        }
        if self.community_id.trim().is_empty() {
            return Err(ConfigError::ValidationError("communityId must be set".to_string()));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_every_ms)
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }

    pub fn send_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.send_delay_min),
            Duration::from_millis(self.send_delay_max),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Generate an example JSON configuration
    pub fn example_json() -> String {
        r#"{
  "token": "",
  "communityId": "",
  "webhooksFile": "webhooks.txt",
  "messagesFile": "messages.txt",
  "scanEveryMs": 5000,
  "desiredPerChannel": 2,
  "sendDelayMin": 300,
  "sendDelayMax": 800,
  "webhookName": "autowebhook",
  "createBurst": 25,
  "burstWindowMs": 10000
}
"#
        .to_string()
    }
}
