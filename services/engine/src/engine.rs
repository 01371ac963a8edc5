//! Engine wiring
//!
//! Builds a [`DiscoveryOrchestrator`] from a [`DiscoveryConfig`] and owns
//! the breaker registry for as long as the engine lives: one run for the
//! CLI, the whole process for the server.

use std::path::Path;
use std::sync::Arc;
use tracing::error;

use crate::config::{ConfigError, DiscoveryConfig};
use crate::discovery::{DiscoveryOrchestrator, DiscoveryResult, EnvironmentClassifier};
use crate::providers::{CredentialProvider, EnvCredentialProvider, HttpInventoryLister, ResourceLister};
use crate::resilience::CircuitBreakerRegistry;

pub struct Engine {
    config: DiscoveryConfig,
    orchestrator: DiscoveryOrchestrator,
}

impl Engine {
    /// Engine backed by environment credentials and the HTTP inventory API
    pub fn from_config(config: DiscoveryConfig) -> Result<Self, ConfigError> {
        let lister = HttpInventoryLister::new(&config.inventory)
            .map_err(|e| ConfigError::Invalid(format!("inventory client: {:#}", e)))?;
        Self::with_providers(config, Arc::new(EnvCredentialProvider::new()), Arc::new(lister))
    }

    pub fn with_providers(
        config: DiscoveryConfig,
        credentials: Arc<dyn CredentialProvider>,
        lister: Arc<dyn ResourceLister>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = EnvironmentClassifier::new(&config.classification)?;
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));

        let orchestrator = DiscoveryOrchestrator::new(
            credentials,
            lister,
            breakers,
            classifier,
            config.scanner.clone(),
            config.retry.clone(),
        );
        Ok(Self {
            config,
            orchestrator,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &DiscoveryOrchestrator {
        &self.orchestrator
    }

    /// One discovery run over the configured accounts
    pub async fn run(&self) -> DiscoveryResult {
        self.orchestrator
            .run(&self.config.accounts, &self.config.default_regions)
            .await
    }
}

/// Load `path` and run once. A configuration failure still yields a result.
pub async fn run_from_path(path: impl AsRef<Path>) -> DiscoveryResult {
    match DiscoveryConfig::load(path).and_then(Engine::from_config) {
        Ok(engine) => engine.run().await,
        Err(e) => {
            error!(error = %e, "Discovery configuration failed");
            DiscoveryResult::configuration_failure(e.to_string())
        }
    }
}
