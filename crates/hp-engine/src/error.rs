use thiserror::Error;

/// Errors returned by a [`crate::MessagingService`] implementation.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Credential rejected by the messaging service")]
    Unauthorized,

    #[error("Community unavailable: {0}")]
    CommunityUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unexpected status {status} from {context}")]
    UnexpectedStatus { status: u16, context: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Messaging service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Persistence error: {0}")]
    Persistence(#[source] std::io::Error),

    #[error("Message source error: {0}")]
    MessageSource(#[source] std::io::Error),
}
