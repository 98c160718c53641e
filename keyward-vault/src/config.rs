//! Vault core configuration.

use crate::error::{VaultError, VaultResult};
use crate::timeout::{VaultTimeout, VaultTimeoutAction};
use keyward_model::UriMatchType;
use serde::{Deserialize, Serialize};

/// Configuration for the vault core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Lifetime of a sorted autofill result set since its last use (ms).
    pub cache_ttl_ms: u64,

    /// Timeout applied to accounts that never chose one.
    pub default_timeout: VaultTimeout,

    pub default_timeout_action: VaultTimeoutAction,

    /// Match type for login URIs that don't carry their own.
    pub default_uri_match: UriMatchType,

    /// DuckDB memory cap for the state database.
    pub duckdb_memory_limit: String,

    pub duckdb_threads: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 3000,
            default_timeout: VaultTimeout::Minutes(15),
            default_timeout_action: VaultTimeoutAction::Lock,
            default_uri_match: UriMatchType::Domain,
            duckdb_memory_limit: "64MB".to_string(),
            duckdb_threads: 1,
        }
    }
}

impl VaultConfig {
    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> VaultResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| VaultError::Config(e.to_string()))?;
        if config.cache_ttl_ms == 0 {
            return Err(VaultError::Config("cache_ttl_ms must be positive".into()));
        }
        config.default_timeout.validate()?;
        Ok(config)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cache_ttl_ms)
    }

    /// Short-lived cache for tests.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            cache_ttl_ms: 50,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.cache_ttl_ms, 3000);
        assert_eq!(config.default_timeout, VaultTimeout::Minutes(15));
        assert_eq!(config.default_timeout_action, VaultTimeoutAction::Lock);
        assert_eq!(config.default_uri_match, UriMatchType::Domain);
        assert_eq!(config.duckdb_memory_limit, "64MB");
        assert_eq!(config.duckdb_threads, 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = VaultConfig::from_json(r#"{"cache_ttl_ms": 500, "default_timeout": -4}"#).unwrap();
        assert_eq!(config.cache_ttl_ms, 500);
        assert_eq!(config.default_timeout, VaultTimeout::OnIdle);
        assert_eq!(config.duckdb_threads, 1);
    }

    #[test]
    fn never_timeout_is_null() {
        let config = VaultConfig::from_json(r#"{"default_timeout": null}"#).unwrap();
        assert_eq!(config.default_timeout, VaultTimeout::Never);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(VaultConfig::from_json(r#"{"cache_ttl_ms": 0}"#).is_err());
        assert!(VaultConfig::from_json(r#"{"default_timeout": -7}"#).is_err());
        assert!(VaultConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_config_has_short_ttl() {
        assert!(VaultConfig::test().cache_ttl_ms < VaultConfig::default().cache_ttl_ms);
    }
}
