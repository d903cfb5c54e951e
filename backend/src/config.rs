use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use thiserror::Error;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_ORS_URL: &str = "https://api.openrouteservice.org";
pub const DEFAULT_USER_AGENT: &str = "route-search/0.1";

/// Server configuration, read from flags with environment fallbacks.
#[derive(Debug, Clone, Parser)]
#[command(name = "backend", about = "Geocoding and routing proxy for the search map")]
pub struct Config {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    #[arg(long, env = "NOMINATIM_URL", default_value = DEFAULT_NOMINATIM_URL)]
    pub nominatim_url: String,

    #[arg(long, env = "ORS_URL", default_value = DEFAULT_ORS_URL)]
    pub ors_url: String,

    /// Without a key the route endpoint answers 503.
    #[arg(long, env = "ORS_API_KEY", hide_env_values = true)]
    pub ors_api_key: Option<String>,

    #[arg(long, env = "ORS_PROFILE", default_value = "driving-car")]
    pub ors_profile: String,

    #[arg(long, env = "SEARCH_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// 0 disables the geocode cache.
    #[arg(long, env = "GEOCODE_CACHE_CAPACITY", default_value_t = 256)]
    pub geocode_cache_capacity: usize,

    #[arg(long, env = "GEOCODE_MIN_INTERVAL_MS", default_value_t = 1100)]
    pub geocode_min_interval_ms: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("timeout_secs must be greater than 0")]
    ZeroTimeout,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nominatim_url.trim().is_empty() {
            return Err(ConfigError::Empty("nominatim_url"));
        }
        if self.ors_url.trim().is_empty() {
            return Err(ConfigError::Empty("ors_url"));
        }
        if self.ors_profile.trim().is_empty() {
            return Err(ConfigError::Empty("ors_profile"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The API key with surrounding blanks removed; an empty key counts as absent.
    pub fn api_key(&self) -> Option<String> {
        self.ors_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            ors_url: DEFAULT_ORS_URL.to_string(),
            ors_api_key: None,
            ors_profile: "driving-car".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            geocode_cache_capacity: 256,
            geocode_min_interval_ms: 1100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let parsed = Config::try_parse_from(["backend"]).unwrap();
        let default = Config::default();
        assert_eq!(parsed.listen, default.listen);
        assert_eq!(parsed.nominatim_url, default.nominatim_url);
        assert_eq!(parsed.ors_profile, default.ors_profile);
        assert_eq!(parsed.timeout_secs, default.timeout_secs);
        assert_eq!(parsed.geocode_min_interval_ms, default.geocode_min_interval_ms);
        assert_eq!(parsed.user_agent, "route-search/0.1");
    }

    #[test]
    fn test_flags_override_defaults() {
        let parsed = Config::try_parse_from([
            "backend",
            "--listen",
            "127.0.0.1:9000",
            "--ors-api-key",
            "secret",
            "--geocode-cache-capacity",
            "0",
        ])
        .unwrap();
        assert_eq!(parsed.listen.port(), 9000);
        assert_eq!(parsed.api_key().as_deref(), Some("secret"));
        assert_eq!(parsed.geocode_cache_capacity, 0);
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let config = Config {
            ors_api_key: Some("   ".into()),
            ..Config::default()
        };
        assert_eq!(config.api_key(), None);
    }

    #[test]
    fn test_validation() {
        assert!(Config::default().validate().is_ok());

        let config = Config {
            nominatim_url: String::new(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Empty("nominatim_url")));

        let config = Config {
            timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }
}
