//! Application configuration loaded from environment variables.

use std::time::Duration;

use commerce::PlatformConfig;
use engine::EngineSettings;

/// Server and pipeline configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `WEBHOOK_SECRET` — shared HMAC secret for webhook deliveries
/// - `PLATFORM_BASE_URL` — commerce platform admin API base
/// - `PLATFORM_ACCESS_TOKEN` — static platform token (optional; OAuth
///   client credentials are used when absent)
/// - `PLATFORM_CLIENT_ID` / `PLATFORM_CLIENT_SECRET` — OAuth credentials
/// - `PLATFORM_LOCATION_ID` — inventory location this service owns
/// - `LOCK_TIMEOUT_SECS` — stale processing-lock timeout (default: 300)
/// - `FANOUT_CONCURRENCY` — max in-flight sibling updates (default: 2)
/// - `FANOUT_MIN_DELAY_MS` — spacing between platform calls (default: 500)
/// - `RETRY_BACKOFF_MS` — pause before the single 429 retry (default: 1000)
/// - `DATABASE_URL` — Postgres connection string (optional; in-memory
///   stores are used when absent)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub webhook_secret: String,
    pub platform_base_url: String,
    pub platform_access_token: Option<String>,
    pub platform_client_id: Option<String>,
    pub platform_client_secret: Option<String>,
    pub platform_location_id: String,
    pub lock_timeout_secs: i64,
    pub fanout_concurrency: usize,
    pub fanout_min_delay_ms: u64,
    pub retry_backoff_ms: u64,
    pub database_url: Option<String>,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 3000),
            log_level: env_or("RUST_LOG", "info"),
            webhook_secret: env_or("WEBHOOK_SECRET", ""),
            platform_base_url: env_or("PLATFORM_BASE_URL", ""),
            platform_access_token: std::env::var("PLATFORM_ACCESS_TOKEN").ok(),
            platform_client_id: std::env::var("PLATFORM_CLIENT_ID").ok(),
            platform_client_secret: std::env::var("PLATFORM_CLIENT_SECRET").ok(),
            platform_location_id: env_or("PLATFORM_LOCATION_ID", ""),
            lock_timeout_secs: env_parsed("LOCK_TIMEOUT_SECS", 300),
            fanout_concurrency: env_parsed("FANOUT_CONCURRENCY", 2),
            fanout_min_delay_ms: env_parsed("FANOUT_MIN_DELAY_MS", 500),
            retry_backoff_ms: env_parsed("RETRY_BACKOFF_MS", 1000),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine tuning derived from the env values.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            lock_timeout: chrono::Duration::seconds(self.lock_timeout_secs),
            fanout_concurrency: self.fanout_concurrency,
            fanout_min_delay: Duration::from_millis(self.fanout_min_delay_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Outbound platform client configuration.
    pub fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            base_url: self.platform_base_url.trim_end_matches('/').to_string(),
            access_token: self.platform_access_token.clone(),
            client_id: self.platform_client_id.clone(),
            client_secret: self.platform_client_secret.clone(),
            location_id: self.platform_location_id.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            webhook_secret: String::new(),
            platform_base_url: String::new(),
            platform_access_token: None,
            platform_client_id: None,
            platform_client_secret: None,
            platform_location_id: String::new(),
            lock_timeout_secs: 300,
            fanout_concurrency: 2,
            fanout_min_delay_ms: 500,
            retry_backoff_ms: 1000,
            database_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.lock_timeout_secs, 300);
        assert_eq!(config.fanout_concurrency, 2);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_engine_settings_conversion() {
        let config = Config {
            lock_timeout_secs: 60,
            fanout_min_delay_ms: 250,
            ..Config::default()
        };
        let settings = config.engine_settings();
        assert_eq!(settings.lock_timeout, chrono::Duration::seconds(60));
        assert_eq!(settings.fanout_min_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_platform_base_url_trailing_slash_trimmed() {
        let config = Config {
            platform_base_url: "https://platform.example/admin/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.platform().base_url, "https://platform.example/admin");
    }
}
