use std::time::Duration;

pub mod logging;

/// Wait applied when a rate-limited response carries no usable retry hint.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_millis(1000);

// ============================================================================
// Channels
// ============================================================================

/// Kind of a channel inside a community.
///
/// Only text channels can host webhooks; every other kind is skipped during
/// reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Other(u8),
}

impl ChannelKind {
    /// Map a Discord channel `type` value (0 = guild text).
    pub fn from_discord_type(kind: u8) -> Self {
        match kind {
            0 => ChannelKind::Text,
            other => ChannelKind::Other(other),
        }
    }

    pub fn is_message_capable(&self) -> bool {
        matches!(self, ChannelKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn text(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ChannelKind::Text,
        }
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// An endpoint as reported by the remote service.
///
/// The secret is optional: webhooks owned by other applications are listed
/// without their token and cannot be addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub id: String,
    pub secret: Option<String>,
    pub channel_id: String,
    pub name: Option<String>,
}

/// A usable delivery endpoint tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: String,
    pub secret: String,
    /// Fully-qualified delivery address, also the registry key
    pub address: String,
    pub channel_id: String,
    /// A dispatch loop currently owns this entry
    pub loop_active: bool,
}

impl Endpoint {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        channel_id: impl Into<String>,
        webhook_base: &str,
    ) -> Self {
        let id = id.into();
        let secret = secret.into();
        let address = endpoint_address(webhook_base, &id, &secret);
        Self {
            id,
            secret,
            address,
            channel_id: channel_id.into(),
            loop_active: false,
        }
    }

    /// Convert a remote endpoint, discarding it when it has no usable secret.
    pub fn from_remote(remote: RemoteEndpoint, webhook_base: &str) -> Option<Self> {
        match remote.secret {
            Some(secret) if !secret.is_empty() => {
                Some(Self::new(remote.id, secret, remote.channel_id, webhook_base))
            }
            _ => None,
        }
    }

    pub fn redacted_address(&self) -> String {
        redact_address(&self.address)
    }
}

/// Build the delivery address `{base}/{id}/{secret}`.
pub fn endpoint_address(webhook_base: &str, id: &str, secret: &str) -> String {
    format!("{}/{}/{}", webhook_base.trim_end_matches('/'), id, secret)
}

/// Replace the trailing secret segment of an address so it can be logged.
pub fn redact_address(address: &str) -> String {
    match address.rfind('/') {
        Some(idx) if idx + 1 < address.len() => format!("{}/***", &address[..idx]),
        _ => address.to_string(),
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Raw response of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryResponse {
    pub status: u16,
    /// Retry hint in seconds (fractions allowed)
    pub retry_after: Option<f64>,
}

impl DeliveryResponse {
    pub fn new(status: u16) -> Self {
        Self { status, retry_after: None }
    }

    pub fn rate_limited(retry_after: Option<f64>) -> Self {
        Self { status: 429, retry_after }
    }

    pub fn classify(&self) -> DeliveryOutcome {
        match self.status {
            401 | 404 => DeliveryOutcome::Invalid { status: self.status },
            429 => DeliveryOutcome::RateLimited {
                wait: retry_wait(self.retry_after),
            },
            200..=299 => DeliveryOutcome::Delivered { status: self.status },
            status => DeliveryOutcome::Transient {
                status: Some(status),
                reason: format!("HTTP {}", status),
            },
        }
    }
}

/// Convert a retry hint in seconds to a wait, rounding up to whole
/// milliseconds. Missing, zero, negative or non-finite hints use the default.
pub fn retry_wait(retry_after: Option<f64>) -> Duration {
    match retry_after {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            Duration::from_millis((secs * 1000.0).ceil() as u64)
        }
        _ => DEFAULT_RATE_LIMIT_WAIT,
    }
}

/// Classified result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { status: u16 },
    /// Endpoint deleted or credential rejected; never retried
    Invalid { status: u16 },
    RateLimited { wait: Duration },
    /// Any other failure, including network errors (`status: None`)
    Transient { status: Option<u16>, reason: String },
}

impl DeliveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Invalid { .. } => "invalid",
            DeliveryOutcome::RateLimited { .. } => "rate_limited",
            DeliveryOutcome::Transient { .. } => "transient",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_address_derivation() {
        let ep = Endpoint::new("123", "abc", "chan-1", "https://discord.com/api/webhooks/");
        assert_eq!(ep.address, "https://discord.com/api/webhooks/123/abc");
        assert!(!ep.loop_active);
        assert_eq!(ep.redacted_address(), "https://discord.com/api/webhooks/123/***");
    }

    #[test]
    fn test_remote_endpoint_without_secret_is_discarded() {
        let base = "https://example.test/webhooks";
        let missing = RemoteEndpoint {
            id: "1".to_string(),
            secret: None,
            channel_id: "c".to_string(),
            name: None,
        };
        let empty = RemoteEndpoint {
            secret: Some(String::new()),
            ..missing.clone()
        };
        let usable = RemoteEndpoint {
            secret: Some("tok".to_string()),
            ..missing.clone()
        };

        assert!(Endpoint::from_remote(missing, base).is_none());
        assert!(Endpoint::from_remote(empty, base).is_none());
        assert_eq!(
            Endpoint::from_remote(usable, base).map(|e| e.address),
            Some("https://example.test/webhooks/1/tok".to_string())
        );
    }

    #[test]
    fn test_classification() {
        assert_eq!(DeliveryResponse::new(204).classify(), DeliveryOutcome::Delivered { status: 204 });
        assert_eq!(DeliveryResponse::new(404).classify(), DeliveryOutcome::Invalid { status: 404 });
        assert_eq!(DeliveryResponse::new(401).classify(), DeliveryOutcome::Invalid { status: 401 });
        assert_eq!(
            DeliveryResponse::rate_limited(Some(2.0)).classify(),
            DeliveryOutcome::RateLimited { wait: Duration::from_millis(2000) }
        );
        // 403 is not part of the permanent set
        assert!(matches!(
            DeliveryResponse::new(403).classify(),
            DeliveryOutcome::Transient { status: Some(403), .. }
        ));
        assert!(matches!(
            DeliveryResponse::new(502).classify(),
            DeliveryOutcome::Transient { status: Some(502), .. }
        ));
    }

    #[test]
    fn test_retry_wait_rounding_and_default() {
        assert_eq!(retry_wait(Some(0.3341)), Duration::from_millis(335));
        assert_eq!(retry_wait(None), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(retry_wait(Some(0.0)), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(retry_wait(Some(f64::NAN)), DEFAULT_RATE_LIMIT_WAIT);
    }

    #[test]
    fn test_channel_kind_mapping() {
        assert!(ChannelKind::from_discord_type(0).is_message_capable());
        assert_eq!(ChannelKind::from_discord_type(2), ChannelKind::Other(2));
        assert!(!ChannelKind::from_discord_type(4).is_message_capable());
    }
}
