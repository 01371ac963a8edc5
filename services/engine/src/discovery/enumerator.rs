//! Resource Enumerator
//!
//! Paginates one account/region listing. Each page fetch is a protected
//! call (retry outside, circuit breaker inside); every raw item goes
//! through the extractor. This is the one discovery stage that returns its
//! failure to the caller: the region scanner owns the isolation.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{CallError, ProviderError};
use super::extractor;
use super::types::ResourceRecord;
use crate::providers::{Page, ResourceLister, Session};
use crate::resilience::{
    with_retry, CircuitBreaker, CircuitBreakerRegistry, RetryAttempt, RetryObserver, RetryPolicy,
};

/// Breaker name for the listing capability
pub const LIST_RESOURCES: &str = "list-resources";

/// Breaker name for the per-account access probe
pub const VALIDATE_ACCESS: &str = "validate-access";

/// Default guard against runaway pagination
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Run one provider call under `policy`, each attempt through `breaker`.
///
/// An open breaker ends the retry loop at once with
/// [`CallError::CircuitOpen`]; otherwise the last provider failure is returned.
pub async fn protected_call<T, F, Fut>(
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    mut op: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let log_attempt = |a: &RetryAttempt<'_, CallError>| {
        if a.will_retry {
            warn!(
                dependency = breaker.name(),
                attempt = a.attempt,
                delay_ms = a.delay.as_millis() as u64,
                error = %a.error,
                "Call failed, retrying"
            );
        }
    };
    let observer: RetryObserver<'_, CallError> = &log_attempt;

    with_retry(policy, Some(observer), || {
        let attempt = op();
        async move {
            breaker
                .call_counting(|| attempt, |e: &ProviderError| e.kind().counts_against_dependency())
                .await
                .map_err(CallError::from)
        }
    })
    .await
}

/// Tracks continuation tokens across pages
struct Paginator {
    next: Option<String>,
    seen: HashSet<String>,
    pages: usize,
    max_pages: usize,
}

impl Paginator {
    fn new(max_pages: usize) -> Self {
        Self {
            next: None,
            seen: HashSet::new(),
            pages: 0,
            max_pages: max_pages.max(1),
        }
    }

    fn token(&self) -> Option<&str> {
        self.next.as_deref()
    }

    /// Record a fetched page; `Ok(true)` if another page follows
    fn advance(&mut self, next_token: Option<String>) -> Result<bool, ProviderError> {
        self.pages += 1;
        let Some(token) = next_token.filter(|t| !t.is_empty()) else {
            self.next = None;
            return Ok(false);
        };

        if !self.seen.insert(token.clone()) {
            return Err(ProviderError::Unclassified(format!(
                "provider repeated continuation token after {} pages",
                self.pages
            )));
        }
        if self.pages >= self.max_pages {
            return Err(ProviderError::Unclassified(format!(
                "pagination exceeded {} pages",
                self.max_pages
            )));
        }

        self.next = Some(token);
        Ok(true)
    }
}

/// Enumerates one account/region; cheap to clone into region tasks
#[derive(Clone)]
pub struct ResourceEnumerator {
    lister: Arc<dyn ResourceLister>,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryPolicy,
    max_pages: usize,
}

impl ResourceEnumerator {
    pub fn new(
        lister: Arc<dyn ResourceLister>,
        breakers: Arc<CircuitBreakerRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lister,
            breakers,
            retry,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// All records for `session`'s account in `region`, in page order
    pub async fn enumerate(
        &self,
        session: &Session,
        region: &str,
    ) -> Result<Vec<ResourceRecord>, CallError> {
        let breaker = self.breakers.get(LIST_RESOURCES);
        let mut paginator = Paginator::new(self.max_pages);
        let mut records = Vec::new();

        loop {
            let page = self.fetch_page(&breaker, session, region, paginator.token()).await?;
            debug!(
                account_id = %session.account_id,
                region,
                page = paginator.pages + 1,
                items = page.items.len(),
                "Fetched page"
            );

            records.extend(
                page.items
                    .iter()
                    .map(|raw| extractor::extract(raw, &session.account_id, region)),
            );

            if !paginator.advance(page.next_token)? {
                break;
            }
        }

        Ok(records)
    }

    async fn fetch_page(
        &self,
        breaker: &CircuitBreaker,
        session: &Session,
        region: &str,
        token: Option<&str>,
    ) -> Result<Page, CallError> {
        let lister = self.lister.as_ref();
        protected_call(&self.retry, breaker, || lister.list_page(session, region, token)).await
    }
}
