//! Region Scanner
//!
//! Fans the regions of one account out over a bounded worker pool. Each
//! region task gets a hard timeout that starts once it holds a worker slot;
//! timeouts, provider failures and panics all come back as region-scoped
//! errors while sibling regions keep running.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::enumerator::{ResourceEnumerator, DEFAULT_MAX_PAGES};
use super::error::{CallError, ErrorKind};
use super::types::{DiscoveryError, ResourceRecord};
use crate::providers::Session;

/// Upper bound on the worker pool
pub const MAX_WORKERS: usize = 256;

/// Region fan-out settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub max_workers: usize,
    pub region_timeout_secs: u64,
    pub max_pages: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            region_timeout_secs: 60,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ScannerConfig {
    pub fn region_timeout(&self) -> Duration {
        Duration::from_secs(self.region_timeout_secs)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    ZeroWorkers,

    #[error("worker pool of {0} exceeds the limit of {max}", max = MAX_WORKERS)]
    TooLarge(usize),
}

/// Fixed number of concurrent region slots
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, PoolError> {
        match size {
            0 => Err(PoolError::ZeroWorkers),
            n if n > MAX_WORKERS => Err(PoolError::TooLarge(n)),
            n => Ok(Self {
                permits: Arc::new(Semaphore::new(n)),
                size: n,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Everything one account's regions produced
#[derive(Debug, Default)]
pub struct RegionScan {
    pub resources: Vec<ResourceRecord>,
    pub errors: Vec<DiscoveryError>,
    /// Regions whose task completed successfully
    pub regions_scanned: usize,
}

enum RegionOutcome {
    Completed(Vec<ResourceRecord>),
    Failed(CallError),
    TimedOut,
    PoolClosed,
    Panicked(String),
}

pub struct RegionScanner {
    enumerator: ResourceEnumerator,
    config: ScannerConfig,
}

impl RegionScanner {
    pub fn new(enumerator: ResourceEnumerator, config: ScannerConfig) -> Self {
        let enumerator = enumerator.with_max_pages(config.max_pages);
        Self { enumerator, config }
    }

    /// Scan `regions` for the session's account. Never fails.
    pub async fn scan(&self, session: &Session, regions: &[String]) -> RegionScan {
        let account_id = session.account_id.as_str();
        let mut scan = RegionScan::default();
        if regions.is_empty() {
            return scan;
        }

        let pool = match WorkerPool::new(self.config.max_workers) {
            Ok(pool) => pool,
            Err(e) => {
                error!(account_id, error = %e, "Could not create region worker pool");
                scan.errors.push(DiscoveryError::region(
                    account_id,
                    &regions.join(","),
                    ErrorKind::Unclassified,
                    format!("failed to create worker pool: {}", e),
                ));
                return scan;
            }
        };

        let limit = self.config.region_timeout();
        let mut tasks = JoinSet::new();
        for region in regions {
            let enumerator = self.enumerator.clone();
            let session = session.clone();
            let permits = pool.permits.clone();
            let task_region = region.clone();

            let task = async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return RegionOutcome::PoolClosed;
                };
                match tokio::time::timeout(limit, enumerator.enumerate(&session, &task_region)).await
                {
                    Ok(Ok(records)) => RegionOutcome::Completed(records),
                    Ok(Err(e)) => RegionOutcome::Failed(e),
                    Err(_) => RegionOutcome::TimedOut,
                }
            };

            let region = region.clone();
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(task)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| RegionOutcome::Panicked(panic_message(payload)));
                (region, outcome)
            });
        }

        let mut pending: BTreeSet<&str> = regions.iter().map(String::as_str).collect();
        while let Some(joined) = tasks.join_next().await {
            let (region, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(account_id, error = %e, "Region task was aborted");
                    continue;
                }
            };
            pending.remove(region.as_str());
            self.record(&mut scan, account_id, &region, outcome, limit);
        }

        for region in pending {
            scan.errors.push(DiscoveryError::region(
                account_id,
                region,
                ErrorKind::Unclassified,
                "region task was aborted before reporting",
            ));
        }

        info!(
            account_id,
            regions = regions.len(),
            regions_scanned = scan.regions_scanned,
            resources = scan.resources.len(),
            errors = scan.errors.len(),
            "Account regions scanned"
        );
        scan
    }

    fn record(
        &self,
        scan: &mut RegionScan,
        account_id: &str,
        region: &str,
        outcome: RegionOutcome,
        limit: Duration,
    ) {
        match outcome {
            RegionOutcome::Completed(records) => {
                debug!(account_id, region, resources = records.len(), "Region scanned");
                scan.regions_scanned += 1;
                for record in &records {
                    if let Some(problem) = &record.extraction_error {
                        scan.errors.push(DiscoveryError::item(record, problem.as_str()));
                    }
                }
                scan.resources.extend(records);
            }
            RegionOutcome::Failed(e) => {
                let kind = e.kind();
                warn!(account_id, region, kind = %kind, error = %e, "Region scan failed");
                scan.errors
                    .push(DiscoveryError::region(account_id, region, kind, e.to_string()));
            }
            RegionOutcome::TimedOut => {
                warn!(account_id, region, timeout_secs = limit.as_secs(), "Region scan timed out");
                scan.errors
                    .push(DiscoveryError::region_timeout(account_id, region, limit));
            }
            RegionOutcome::PoolClosed => {
                error!(account_id, region, "Worker pool closed before region could run");
                scan.errors.push(DiscoveryError::region(
                    account_id,
                    region,
                    ErrorKind::Unclassified,
                    "worker pool closed before the region could run",
                ));
            }
            RegionOutcome::Panicked(message) => {
                error!(account_id, region, panic = %message, "Region task panicked");
                scan.errors.push(DiscoveryError::region(
                    account_id,
                    region,
                    ErrorKind::Unclassified,
                    format!("region task panicked: {}", message),
                ));
            }
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::error::{ProviderError, Severity};
    use crate::discovery::fixtures::{instance, RegionScript, ScriptedLister};
    use crate::discovery::types::ErrorScope;
    use crate::resilience::{CircuitBreakerRegistry, RetryPolicy};

    const ACCOUNT: &str = "111111111111";

    fn scanner(lister: ScriptedLister, config: ScannerConfig) -> RegionScanner {
        let enumerator = ResourceEnumerator::new(
            Arc::new(lister),
            Arc::new(CircuitBreakerRegistry::default()),
            RetryPolicy::no_retry(),
        );
        RegionScanner::new(enumerator, config)
    }

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|r| r.to_string()).collect()
    }

    fn session() -> Session {
        Session::with_token(ACCOUNT, "token")
    }

    #[test]
    fn test_worker_pool_bounds() {
        assert_eq!(WorkerPool::new(0).unwrap_err(), PoolError::ZeroWorkers);
        assert_eq!(WorkerPool::new(MAX_WORKERS + 1).unwrap_err(), PoolError::TooLarge(257));
        assert_eq!(WorkerPool::new(4).unwrap().size(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_region_does_not_affect_siblings() {
        let lister = ScriptedLister::new()
            .region(ACCOUNT, "us-east-1", RegionScript::Pages(vec![vec![instance("a"), instance("b")]]))
            .region(ACCOUNT, "eu-west-1", RegionScript::Hang)
            .region(ACCOUNT, "ap-south-1", RegionScript::Pages(vec![vec![instance("c")]]));
        let scan = scanner(lister, ScannerConfig::default())
            .scan(&session(), &regions(&["us-east-1", "eu-west-1", "ap-south-1"]))
            .await;

        assert_eq!(scan.resources.len(), 3);
        assert!(scan.resources.iter().all(|r| r.region != "eu-west-1"));
        assert_eq!(scan.regions_scanned, 2);

        assert_eq!(scan.errors.len(), 1);
        let err = &scan.errors[0];
        assert_eq!(err.scope, ErrorScope::Region);
        assert_eq!(err.region.as_deref(), Some("eu-west-1"));
        assert_eq!(err.error_kind, ErrorKind::Timeout);
        assert_eq!(err.severity, Severity::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_starts_when_worker_is_held() {
        // One worker: the second region waits for the first, which takes
        // 40s of a 60s budget. The second must still get its full budget.
        struct SlowLister;

        #[async_trait::async_trait]
        impl crate::providers::ResourceLister for SlowLister {
            fn name(&self) -> &str {
                "slow"
            }

            async fn list_page(
                &self,
                _session: &Session,
                _region: &str,
                _token: Option<&str>,
            ) -> Result<crate::providers::Page, ProviderError> {
                tokio::time::sleep(Duration::from_secs(40)).await;
                Ok(crate::providers::Page::last(vec![instance("x")]))
            }
        }

        let enumerator = ResourceEnumerator::new(
            Arc::new(SlowLister),
            Arc::new(CircuitBreakerRegistry::default()),
            RetryPolicy::no_retry(),
        );
        let config = ScannerConfig {
            max_workers: 1,
            ..ScannerConfig::default()
        };
        let scan = RegionScanner::new(enumerator, config)
            .scan(&session(), &regions(&["us-east-1", "us-west-2"]))
            .await;

        assert!(scan.errors.is_empty(), "unexpected errors: {:?}", scan.errors);
        assert_eq!(scan.regions_scanned, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_region_failures_keep_their_kind() {
        let lister = ScriptedLister::new()
            .region(
                ACCOUNT,
                "me-south-1",
                RegionScript::Fail(ProviderError::RegionNotEnabled("opt-in required".into())),
            )
            .region(ACCOUNT, "us-east-1", RegionScript::Pages(vec![vec![instance("a")]]));
        let scan = scanner(lister, ScannerConfig::default())
            .scan(&session(), &regions(&["me-south-1", "us-east-1"]))
            .await;

        assert_eq!(scan.resources.len(), 1);
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(scan.errors[0].error_kind, ErrorKind::RegionNotEnabled);
        assert_eq!(scan.errors[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_panicking_region_is_isolated() {
        let lister = ScriptedLister::new()
            .region(ACCOUNT, "us-east-1", RegionScript::Panic)
            .region(ACCOUNT, "us-east-2", RegionScript::Pages(vec![vec![instance("a")]]));
        let scan = scanner(lister, ScannerConfig::default())
            .scan(&session(), &regions(&["us-east-1", "us-east-2"]))
            .await;

        assert_eq!(scan.resources.len(), 1);
        assert_eq!(scan.regions_scanned, 1);
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(scan.errors[0].region.as_deref(), Some("us-east-1"));
        assert_eq!(scan.errors[0].error_kind, ErrorKind::Unclassified);
        assert!(scan.errors[0].message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_pool_failure_covers_all_regions() {
        let config = ScannerConfig {
            max_workers: 0,
            ..ScannerConfig::default()
        };
        let scan = scanner(ScriptedLister::new(), config)
            .scan(&session(), &regions(&["us-east-1", "eu-west-1"]))
            .await;

        assert!(scan.resources.is_empty());
        assert_eq!(scan.regions_scanned, 0);
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(scan.errors[0].scope, ErrorScope::Region);
        assert_eq!(scan.errors[0].region.as_deref(), Some("us-east-1,eu-west-1"));
    }

    #[tokio::test]
    async fn test_degraded_records_are_kept_with_item_errors() {
        let lister = ScriptedLister::new().region(
            ACCOUNT,
            "us-east-1",
            RegionScript::Pages(vec![vec![
                instance("good"),
                serde_json::json!({"Engine": "mysql"}),
            ]]),
        );
        let scan = scanner(lister, ScannerConfig::default())
            .scan(&session(), &regions(&["us-east-1"]))
            .await;

        assert_eq!(scan.resources.len(), 2);
        assert_eq!(scan.regions_scanned, 1);
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(scan.errors[0].scope, ErrorScope::Item);
        assert_eq!(scan.errors[0].error_kind, ErrorKind::ExtractionError);
        assert!(scan.errors[0].message.contains("no identifier"));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
