use std::time::Duration;

use common::GraphicVariantId;
use thiserror::Error;

/// Errors returned by the commerce platform client.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// The platform rejected the call with a 429. Retry after the given
    /// delay, if the platform suggested one.
    #[error("Rate limited by platform")]
    RateLimited { retry_after: Option<Duration> },

    /// A transient failure (5xx, connection reset) worth retrying.
    #[error("Transient platform error: {0}")]
    Transient(String),

    /// Authentication with the platform failed.
    #[error("Platform authentication failed: {0}")]
    Auth(String),

    /// The variant does not exist on the platform.
    #[error("Variant not found on platform: {0}")]
    VariantNotFound(GraphicVariantId),

    /// The platform answered with an unexpected status or body.
    #[error("Unexpected platform response: {0}")]
    Unexpected(String),

    /// The underlying HTTP call failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CommerceError {
    /// Whether a retry after backoff could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CommerceError::Transient(_) | CommerceError::RateLimited { .. }
        )
    }
}

/// Result type for commerce client operations.
pub type Result<T> = std::result::Result<T, CommerceError>;
