//! Discovery Orchestrator
//!
//! Walks the configured accounts one after another, resolving credentials,
//! probing access, and handing each account's regions to the scanner. No
//! failure escapes a run: every problem becomes a [`DiscoveryError`] in the
//! returned [`DiscoveryResult`].

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::classifier::EnvironmentClassifier;
use super::enumerator::{protected_call, ResourceEnumerator, VALIDATE_ACCESS};
use super::error::ErrorKind;
use super::scanner::{panic_message, RegionScan, RegionScanner, ScannerConfig};
use super::types::{AccountDescriptor, DiscoveryError, DiscoveryResult};
use crate::providers::{CredentialProvider, ResourceLister, Session};
use crate::resilience::{CircuitBreakerRegistry, RetryPolicy};

pub struct DiscoveryOrchestrator {
    credentials: Arc<dyn CredentialProvider>,
    lister: Arc<dyn ResourceLister>,
    breakers: Arc<CircuitBreakerRegistry>,
    classifier: EnvironmentClassifier,
    scanner: RegionScanner,
    retry: RetryPolicy,
}

impl DiscoveryOrchestrator {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        lister: Arc<dyn ResourceLister>,
        breakers: Arc<CircuitBreakerRegistry>,
        classifier: EnvironmentClassifier,
        scanner: ScannerConfig,
        retry: RetryPolicy,
    ) -> Self {
        let enumerator = ResourceEnumerator::new(lister.clone(), breakers.clone(), retry.clone());
        Self {
            credentials,
            lister,
            breakers,
            classifier,
            scanner: RegionScanner::new(enumerator, scanner),
            retry,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Scan every account. Never fails.
    pub async fn run(
        &self,
        accounts: &[AccountDescriptor],
        default_regions: &[String],
    ) -> DiscoveryResult {
        let mut result = DiscoveryResult::begin();
        info!(
            run_id = %result.run_id,
            accounts = accounts.len(),
            lister = self.lister.name(),
            "Starting discovery run"
        );

        for account in accounts {
            result.accounts_attempted += 1;

            let outcome = AssertUnwindSafe(self.scan_account(account, default_regions))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(DiscoveryError::account(
                        &account.id,
                        ErrorKind::Unclassified,
                        format!("account scan panicked: {}", panic_message(payload)),
                    ))
                });

            match outcome {
                Ok(scan) => {
                    result.accounts_scanned += 1;
                    result.regions_scanned += scan.regions_scanned;
                    result.errors.extend(scan.errors);
                    result
                        .resources
                        .extend(scan.resources.into_iter().map(|mut record| {
                            self.classifier.apply(&mut record);
                            record
                        }));
                }
                Err(e) => {
                    error!(
                        account_id = %account.id,
                        account = account.display_name(),
                        kind = %e.error_kind,
                        error = %e.message,
                        "Account skipped"
                    );
                    result.errors.push(e);
                }
            }
        }

        let result = result.finish();
        let summary = result.summary();
        info!(
            run_id = %result.run_id,
            accounts_attempted = result.accounts_attempted,
            accounts_scanned = result.accounts_scanned,
            regions_scanned = result.regions_scanned,
            resources = result.resources.len(),
            errors = result.errors.len(),
            degraded_records = summary.degraded_records,
            duration_ms = result.duration_ms,
            "Discovery run complete"
        );
        for breaker in self.breakers.snapshot() {
            info!(
                breaker = %breaker.name,
                state = %breaker.state,
                failure_count = breaker.failure_count,
                "Circuit breaker state"
            );
        }
        result
    }

    async fn scan_account(
        &self,
        account: &AccountDescriptor,
        default_regions: &[String],
    ) -> Result<RegionScan, DiscoveryError> {
        let session = self.validate_access(account).await?;

        let regions = account.resolve_regions(default_regions);
        if regions.is_empty() {
            warn!(account_id = %account.id, "No regions configured for account");
        }

        info!(
            account_id = %account.id,
            account = account.display_name(),
            regions = regions.len(),
            "Scanning account"
        );
        Ok(self.scanner.scan(&session, &regions).await)
    }

    /// Resolve credentials and probe the account
    async fn validate_access(&self, account: &AccountDescriptor) -> Result<Session, DiscoveryError> {
        let session = self
            .credentials
            .get_credentials(account)
            .await
            .map_err(|e| DiscoveryError::account(&account.id, e.kind(), e.to_string()))?;

        if session.is_expired() {
            return Err(DiscoveryError::account(
                &account.id,
                ErrorKind::AccessDenied,
                "resolved credentials are already expired",
            ));
        }

        let breaker = self.breakers.get(VALIDATE_ACCESS);
        let lister = self.lister.as_ref();
        protected_call(&self.retry, &breaker, || lister.validate_access(&session))
            .await
            .map_err(|e| DiscoveryError::account(&account.id, e.kind(), e.to_string()))?;

        Ok(session)
    }
}
