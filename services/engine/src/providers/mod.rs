//! Provider Adapters
//!
//! The engine's outbound seams. Everything the discovery engine consumes
//! (resource listing, credentials) and the sink it hands results to are
//! async traits, so the engine can be driven by the HTTP inventory adapter
//! in production and by scripted providers in tests.

mod credentials;
mod http;
mod sink;

pub use credentials::*;
pub use http::*;
pub use sink::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::discovery::{AccountDescriptor, DiscoveryResult, ProviderError};

/// One page of raw provider records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    /// Continuation token; `None` on the last page
    #[serde(default)]
    pub next_token: Option<String>,
}

impl Page {
    pub fn last(items: Vec<serde_json::Value>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    pub fn with_next(items: Vec<serde_json::Value>, token: impl Into<String>) -> Self {
        Self {
            items,
            next_token: Some(token.into()),
        }
    }
}

/// Paginated database-instance listing for one account
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Cheap probe that the session may act on its account
    async fn validate_access(&self, _session: &Session) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Fetch one page; `page_token` is `None` for the first page
    async fn list_page(
        &self,
        session: &Session,
        region: &str,
        page_token: Option<&str>,
    ) -> Result<Page, ProviderError>;
}

/// Resolves an account descriptor into a session
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(&self, account: &AccountDescriptor) -> Result<Session, ProviderError>;
}

/// Receives finished results (persistence, alerting); hand-off is not retried
#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, result: &DiscoveryResult) -> anyhow::Result<()>;
}
