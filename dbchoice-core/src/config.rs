//! Registry configuration

use crate::naming::is_valid_identifier;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_CACHE_NAMESPACE: &str = "DBCHOICE_CACHE_NAMESPACE";
pub const ENV_CACHE_TTL_SECS: &str = "DBCHOICE_CACHE_TTL_SECS";
pub const ENV_ENUM_GUARD_PREFIX: &str = "DBCHOICE_ENUM_GUARD_PREFIX";

/// Configuration for a choice registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Prefix of every cache key.
    pub cache_namespace: String,
    /// TTL applied to cached choice lists.
    pub cache_ttl: Duration,
    /// Prepended to derived member identifiers that are empty or start with a digit.
    pub enum_guard_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_namespace: "dbchoice".to_string(),
            cache_ttl: Duration::from_secs(3600), // 1 hour
            enum_guard_prefix: "K_".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = namespace.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_guard_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.enum_guard_prefix = prefix.into();
        self
    }

    /// Defaults overridden by any `DBCHOICE_*` environment variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(namespace) = lookup(ENV_CACHE_NAMESPACE) {
            config.cache_namespace = namespace;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(prefix) = lookup(ENV_ENUM_GUARD_PREFIX) {
            config.enum_guard_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_namespace.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache_namespace".to_string(),
                value: self.cache_namespace.clone(),
                reason: "cache_namespace must not be empty".to_string(),
            });
        }

        if self.cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: format!("{:?}", self.cache_ttl),
                reason: "cache_ttl must be positive".to_string(),
            });
        }

        if !is_valid_identifier(&self.enum_guard_prefix) {
            return Err(ConfigError::InvalidValue {
                field: "enum_guard_prefix".to_string(),
                value: self.enum_guard_prefix.clone(),
                reason: "enum_guard_prefix must be a valid identifier".to_string(),
            });
        }

        Ok(())
    }
}
