use std::time::{Duration, Instant};

use async_trait::async_trait;
use backon::Retryable;
use common::GraphicVariantId;
use reqwest::{StatusCode, header::HeaderMap};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{CommerceError, Result, client::CommerceClient, retry::lookup_backoff};

/// Connection settings for the commerce platform's admin API.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Base URL of the admin API, without a trailing slash.
    pub base_url: String,
    /// Static access token. When absent, a token is fetched from the OAuth
    /// endpoint using the client credentials and cached until expiry.
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Location whose inventory levels this service owns.
    pub location_id: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct VariantEnvelope {
    variant: VariantBody,
}

#[derive(Deserialize)]
struct VariantBody {
    inventory_item_id: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// HTTP client for the commerce platform.
///
/// The access token is cached with its expiry; the cache mutex is held
/// across a refresh, so concurrent callers collapse into a single flight
/// instead of issuing duplicate token requests.
pub struct HttpCommerceClient {
    http: reqwest::Client,
    config: PlatformConfig,
    token: Mutex<Option<CachedToken>>,
}

impl HttpCommerceClient {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let (client_id, client_secret) = match (&self.config.client_id, &self.config.client_secret)
        {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(CommerceError::Auth(
                    "no access token and no client credentials configured".to_string(),
                ));
            }
        };

        tracing::debug!("refreshing platform access token");
        let response = self
            .http
            .post(format!("{}/oauth/token", self.config.base_url))
            .json(&serde_json::json!({
                "client_id": client_id,
                "client_secret": client_secret,
                "grant_type": "client_credentials",
            }))
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let body: TokenResponse = response.json().await?;

        // Refresh a minute early so in-flight calls never race expiry.
        let ttl = Duration::from_secs(body.expires_in.unwrap_or(3600).saturating_sub(60));
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(body.access_token)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => Err(CommerceError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CommerceError::Auth(format!(
                "platform returned {status}"
            ))),
            status if status.is_server_error() => Err(CommerceError::Transient(format!(
                "platform returned {status}"
            ))),
            status => Err(CommerceError::Unexpected(format!(
                "platform returned {status}"
            ))),
        }
    }

    async fn fetch_inventory_handle(&self, variant_id: &GraphicVariantId) -> Result<String> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/variants/{}", self.config.base_url, variant_id))
            .header("X-Platform-Access-Token", token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CommerceError::VariantNotFound(variant_id.clone()));
        }

        let response = Self::check_status(response).await?;
        let body: VariantEnvelope = response.json().await?;

        body.variant.inventory_item_id.ok_or_else(|| {
            CommerceError::Unexpected(format!("variant {variant_id} has no inventory item"))
        })
    }
}

/// Parses a `Retry-After` header given in seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("Retry-After")?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl CommerceClient for HttpCommerceClient {
    #[tracing::instrument(skip(self))]
    async fn inventory_handle(&self, variant_id: &GraphicVariantId) -> Result<String> {
        (|| self.fetch_inventory_handle(variant_id))
            .retry(lookup_backoff())
            .when(CommerceError::is_transient)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn set_inventory_level(&self, inventory_handle: &str, available: i64) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/inventory_levels/set", self.config.base_url))
            .header("X-Platform-Access-Token", token)
            .json(&serde_json::json!({
                "location_id": self.config.location_id,
                "inventory_item_id": inventory_handle,
                "available": available,
            }))
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }
}
