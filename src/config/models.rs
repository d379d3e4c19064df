use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::auth::{CacheConfig, Client};

#[derive(Debug, Deserialize, Serialize, Validate, Default)]
pub struct GateConfig {
    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub cache: CacheSettings,

    /// Tokens registered with no permissions
    #[garde(inner(length(min = 1)))]
    #[serde(default)]
    pub tokens: Vec<String>,

    /// Clients registered with explicit permissions
    #[garde(custom(validate_clients))]
    #[serde(default)]
    pub clients: Vec<Client>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String,  // trace, debug, info, warn, error

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Settings for the cache in front of the fallback resolver
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CacheSettings {
    #[garde(skip)]
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Seconds before an entry expires, 0 means never
    #[garde(skip)]
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum number of cached lookups, 0 means unbounded
    #[garde(skip)]
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[garde(range(min = 1, max = 86400))]
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_seconds: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_max_entries() -> usize {
    10_000
}

fn default_janitor_interval() -> u64 {
    60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
            max_entries: 10_000,
            janitor_interval_seconds: 60,
        }
    }
}

impl CacheSettings {
    /// Cache configuration for a provider, or `None` when caching is disabled
    pub fn cache_config(&self) -> Option<CacheConfig> {
        if !self.enabled {
            return None;
        }

        let default_ttl = match self.ttl_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Some(CacheConfig {
            max_entries: self.max_entries,
            default_ttl,
            janitor_interval: Duration::from_secs(self.janitor_interval_seconds),
        })
    }
}

fn validate_clients(value: &[Client], _: &()) -> garde::Result {
    if value.iter().any(|client| client.token().is_empty()) {
        return Err(garde::Error::new("client token must not be empty"));
    }
    Ok(())
}
