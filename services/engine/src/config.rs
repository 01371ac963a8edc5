//! Discovery configuration
//!
//! Loaded from a JSON file; every section falls back to its defaults.
//!
//! ```json
//! {
//!   "default_regions": ["us-east-1", "eu-west-1"],
//!   "accounts": [
//!     {"id": "111111111111", "name": "payments", "credential_ref": "PAYMENTS_TOKEN"},
//!     {"id": "222222222222", "credential_ref": "DATA_TOKEN", "regions": ["us-west-2"]}
//!   ],
//!   "scanner": {"max_workers": 4, "region_timeout_secs": 60},
//!   "retry": {"max_attempts": 3, "base_delay_ms": 500},
//!   "circuit_breaker": {"failure_threshold": 5, "timeout_secs": 60},
//!   "classification": {"account_mappings": {"111111111111": "production"}},
//!   "inventory": {"base_url": "http://inventory.internal"}
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::discovery::{
    AccountDescriptor, ClassificationConfig, EnvironmentClassifier, ScannerConfig, WorkerPool,
};
use crate::providers::InventoryConfig;
use crate::resilience::{CircuitBreakerConfig, PolicyError, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid retry policy: {0}")]
    Retry(#[from] PolicyError),

    #[error("invalid naming pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Everything one discovery run needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub default_regions: Vec<String>,
    pub accounts: Vec<AccountDescriptor>,
    pub scanner: ScannerConfig,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub classification: ClassificationConfig,
    pub inventory: InventoryConfig,
}

impl DiscoveryConfig {
    /// Read, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            accounts = config.accounts.len(),
            default_regions = config.default_regions.len(),
            "Loaded discovery config"
        );
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.id.trim().is_empty() {
                return Err(ConfigError::Invalid("account id must not be empty".into()));
            }
            if account.credential_ref.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "account {} has an empty credential_ref",
                    account.id
                )));
            }
            if let Some(regions) = &account.regions {
                if regions.iter().any(|r| r.trim().is_empty()) {
                    return Err(ConfigError::Invalid(format!(
                        "account {} has an empty region override",
                        account.id
                    )));
                }
            }
            if !seen.insert(account.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "account {} is listed more than once",
                    account.id
                )));
            }
        }

        if self.default_regions.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::Invalid("default_regions contains an empty region".into()));
        }

        WorkerPool::new(self.scanner.max_workers)
            .map_err(|e| ConfigError::Invalid(format!("scanner.max_workers: {}", e)))?;
        if self.scanner.region_timeout_secs == 0 {
            return Err(ConfigError::Invalid("scanner.region_timeout_secs must be > 0".into()));
        }
        if self.scanner.max_pages == 0 {
            return Err(ConfigError::Invalid("scanner.max_pages must be > 0".into()));
        }

        self.retry.validate()?;

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker thresholds must be at least 1".into(),
            ));
        }

        EnvironmentClassifier::new(&self.classification)?;

        if self.inventory.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("inventory.base_url must not be empty".into()));
        }
        Ok(())
    }
}
