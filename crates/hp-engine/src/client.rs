//! Messaging service client
//!
//! [`MessagingService`] is the seam between the engine and the remote
//! service. [`DiscordService`] implements it over the Discord REST API:
//! - Bot-token authenticated channel and webhook management
//! - Webhook delivery returning the raw status and retry hint
//! - Status mapping for community/permission failures

use async_trait::async_trait;
use hp_common::{redact_address, Channel, ChannelKind, DeliveryResponse, RemoteEndpoint};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ServiceError;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Account the bot token belongs to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
}

/// Remote messaging service operations used by the engine
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Verify the credential and return the account it belongs to
    async fn current_identity(&self) -> ServiceResult<Identity>;

    async fn list_channels(&self, community_id: &str) -> ServiceResult<Vec<Channel>>;

    async fn list_endpoints(&self, channel: &Channel) -> ServiceResult<Vec<RemoteEndpoint>>;

    async fn create_endpoint(&self, channel: &Channel, name: &str) -> ServiceResult<RemoteEndpoint>;

    /// POST one body to an endpoint address. Any HTTP status is returned as
    /// `Ok`; only transport failures are errors.
    async fn deliver(&self, address: &str, body: &str) -> ServiceResult<DeliveryResponse>;
}

/// Configuration for the Discord client
#[derive(Debug, Clone)]
pub struct DiscordServiceConfig {
    /// REST API base, e.g. `https://discord.com/api/v10`
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for DiscordServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://discord.com/api/v10".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl WebhookPayload {
    fn into_remote(self, fallback_channel: &str) -> RemoteEndpoint {
        RemoteEndpoint {
            id: self.id,
            secret: self.token,
            channel_id: self.channel_id.unwrap_or_else(|| fallback_channel.to_string()),
            name: self.name,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateWebhookPayload<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct ExecuteWebhookPayload<'a> {
    content: &'a str,
}

/// Body of a 429 response
#[derive(Debug, Deserialize, Default)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Discord REST implementation of [`MessagingService`]
pub struct DiscordService {
    client: Client,
    config: DiscordServiceConfig,
    token: String,
}

impl DiscordService {
    pub fn new(token: impl Into<String>) -> ServiceResult<Self> {
        Self::with_config(token, DiscordServiceConfig::default())
    }

    pub fn with_config(token: impl Into<String>, config: DiscordServiceConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        info!(
            api_base_url = %config.api_base_url,
            timeout_ms = config.request_timeout.as_millis() as u64,
            "DiscordService initialized"
        );

        Ok(Self {
            client,
            config,
            token: token.into(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("Authorization", format!("Bot {}", self.token))
    }

    /// Map non-success statuses shared by every management call.
    fn check_status(response: Response, context: &str) -> ServiceResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(ServiceError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ServiceError::PermissionDenied(context.to_string())),
            _ => Err(ServiceError::UnexpectedStatus {
                status: status.as_u16(),
                context: context.to_string(),
            }),
        }
    }
}

#[async_trait]
impl MessagingService for DiscordService {
    async fn current_identity(&self) -> ServiceResult<Identity> {
        let response = self
            .authorized(self.client.get(self.api_url("/users/@me")))
            .send()
            .await?;
        let response = Self::check_status(response, "users/@me")?;
        Ok(response.json::<Identity>().await?)
    }

    async fn list_channels(&self, community_id: &str) -> ServiceResult<Vec<Channel>> {
        let context = format!("guild {}", community_id);
        let response = self
            .authorized(self.client.get(self.api_url(&format!("/guilds/{}/channels", community_id))))
            .send()
            .await?;

        // A guild the bot cannot see is indistinguishable from a missing one
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            return Err(ServiceError::CommunityUnavailable(community_id.to_string()));
        }
        let response = Self::check_status(response, &context)?;

        let channels: Vec<ChannelPayload> = response.json().await?;
        debug!(community_id = %community_id, count = channels.len(), "Fetched channels");

        Ok(channels
            .into_iter()
            .map(|c| Channel {
                name: c.name.unwrap_or_default(),
                id: c.id,
                kind: ChannelKind::from_discord_type(c.kind),
            })
            .collect())
    }

    async fn list_endpoints(&self, channel: &Channel) -> ServiceResult<Vec<RemoteEndpoint>> {
        let context = format!("channel {} webhooks", channel.id);
        let response = self
            .authorized(self.client.get(self.api_url(&format!("/channels/{}/webhooks", channel.id))))
            .send()
            .await?;
        let response = Self::check_status(response, &context)?;

        let hooks: Vec<WebhookPayload> = response.json().await?;
        Ok(hooks
            .into_iter()
            .map(|h| h.into_remote(&channel.id))
            .collect())
    }

    async fn create_endpoint(&self, channel: &Channel, name: &str) -> ServiceResult<RemoteEndpoint> {
        let context = format!("create webhook in channel {}", channel.id);
        let response = self
            .authorized(self.client.post(self.api_url(&format!("/channels/{}/webhooks", channel.id))))
            .json(&CreateWebhookPayload { name })
            .send()
            .await?;
        let response = Self::check_status(response, &context)?;

        let hook: WebhookPayload = response.json().await?;
        Ok(hook.into_remote(&channel.id))
    }

    async fn deliver(&self, address: &str, body: &str) -> ServiceResult<DeliveryResponse> {
        let response = self
            .client
            .post(address)
            .json(&ExecuteWebhookPayload { content: body })
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 429 {
            return Ok(DeliveryResponse::new(status));
        }

        // Prefer the JSON hint, fall back to the Retry-After header
        let header_hint = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok());

        let body_hint = match response.text().await {
            Ok(text) => serde_json::from_str::<RateLimitBody>(&text)
                .unwrap_or_default()
                .retry_after,
            Err(e) => {
                warn!(address = %redact_address(address), error = %e, "Failed reading rate limit body");
                None
            }
        };

        Ok(DeliveryResponse::rate_limited(body_hint.or(header_hint)))
    }
}
