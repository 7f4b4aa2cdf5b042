use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use matchmaker::MatchmakerConfig;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Gateway configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Shared state backend; only `memory://` is built in
    pub store_url: String,
    pub jwt_secret: String,
    /// Collaboration service base URL; sessions are minted locally when unset
    pub session_service_url: Option<String>,
    pub session_service_timeout: Duration,
    pub matchmaker: MatchmakerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = MatchmakerConfig::default();

        let store_url = var("STORE_URL").unwrap_or_else(|| "memory://".to_string());
        if !store_url.starts_with("memory://") {
            bail!("STORE_URL scheme not supported: {}", store_url);
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string())
                .parse()
                .context("BIND_ADDR must be a socket address")?,
            store_url,
            jwt_secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            session_service_url: var("SESSION_SERVICE_URL").filter(|url| !url.trim().is_empty()),
            session_service_timeout: millis(&var, "SESSION_SERVICE_TIMEOUT_MS", Duration::from_secs(5))?,
            matchmaker: MatchmakerConfig {
                acceptance_timeout: millis(&var, "ACCEPTANCE_TIMEOUT_MS", defaults.acceptance_timeout)?,
                search_interval: millis(&var, "SEARCH_INTERVAL_MS", defaults.search_interval)?,
                ..defaults
            },
        })
    }
}

fn millis(var: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match var(key) {
        Some(raw) => {
            let ms: u64 = raw
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", key))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.store_url, "memory://");
        assert!(config.session_service_url.is_none());
        assert_eq!(config.matchmaker.acceptance_timeout, Duration::from_secs(15));
        assert_eq!(config.matchmaker.search_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("ACCEPTANCE_TIMEOUT_MS", "2500"),
            ("SEARCH_INTERVAL_MS", "100"),
            ("SESSION_SERVICE_URL", "http://collab:8080"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.matchmaker.acceptance_timeout, Duration::from_millis(2500));
        assert_eq!(config.matchmaker.search_interval, Duration::from_millis(100));
        assert_eq!(config.session_service_url.as_deref(), Some("http://collab:8080"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", "x"), ("STORE_URL", "redis://cache:6379")])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", "x"), ("SEARCH_INTERVAL_MS", "soon")])).is_err());
    }
}
