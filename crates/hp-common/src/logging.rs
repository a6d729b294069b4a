//! Structured Logging Configuration
//!
//! - Human-readable output by default, JSON with `LOG_FORMAT=json`
//! - `RUST_LOG` filter, defaulting to `info`
//!
//! The engine runs its work inside spans, so every line carries the context
//! it was logged in:
//! - `dispatch_loop{address}`: one per webhook send loop (address redacted)
//! - `reconcile_pass{pass}`: one per driver tick, numbered from 1
//! - `create_webhook{channel_id, slot}`: one per creation in a burst
//!
//! In JSON mode the span stack is flattened into each event and a closing
//! event is emitted per span, which gives pass and creation durations for
//! free. Text mode prints the span stack as a prefix only.
//!
//! Webhook secrets must never reach a log line; log addresses through
//! [`crate::redact_address`].

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format selected by `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }

    /// Anything other than `json` (case-insensitive) is text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(service_name: &str) {
    let format = LogFormat::from_env();
    let registry = tracing_subscriber::registry().with(env_filter());

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true),
            )
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init(),
    }

    tracing::info!(service = service_name, format = ?format, "Logging initialized");
}
