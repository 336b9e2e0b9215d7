//! Client for the external commerce platform's inventory API.
//!
//! Two calls matter to the stock-sync core: resolving a variant's inventory
//! handle, and setting the available count for a handle at the configured
//! location. Both are rate limited by the platform, so errors distinguish
//! 429s (retryable with backoff) from other transient and permanent
//! failures.

mod client;
mod error;
mod http;
mod mock;
mod retry;

pub use client::CommerceClient;
pub use error::{CommerceError, Result};
pub use http::{HttpCommerceClient, PlatformConfig};
pub use mock::InMemoryCommerceClient;
pub use retry::lookup_backoff;
