//! FILENAME: metric-engine/src/config.rs
//! PURPOSE: Engine configuration with defaults, loadable from JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::UnknownOperatorPolicy;
use crate::number_format::{NumberFormatter, DEFAULT_CURRENCY_SYMBOL, DEFAULT_NULL_DISPLAY};

/// Default cache lifetime: five minutes.
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid engine configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub unknown_operator: UnknownOperatorPolicy,
    pub null_display: String,
    pub currency_symbol: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache: CacheConfig::default(),
            unknown_operator: UnknownOperatorPolicy::default(),
            null_display: DEFAULT_NULL_DISPLAY.to_string(),
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses a configuration; absent keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.enabled && self.cache.ttl_ms == 0 {
            return Err(ConfigError::Invalid(
                "cache.ttlMs must be positive when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn formatter(&self) -> NumberFormatter {
        NumberFormatter {
            currency_symbol: self.currency_symbol.clone(),
            null_display: self.null_display.clone(),
        }
    }
}
