//! Backoff configuration for retryable platform calls.
//!
//! Uses `backon` for exponential backoff with jitter. This backoff covers
//! transient failures and 429s on idempotent lookup calls; level-set calls
//! get their single bounded retry at the call site instead, where the
//! platform's `Retry-After` hint takes precedence.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for variant/handle lookup retries.
///
/// - Min delay: 200ms
/// - Max delay: 2s
/// - Max attempts: 3
/// - Jitter enabled
pub fn lookup_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(3)
        .with_jitter()
}
