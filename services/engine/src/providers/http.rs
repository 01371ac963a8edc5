//! HTTP Inventory Adapter
//!
//! Lists database instances from the inventory API that fronts each cloud
//! account:
//!
//! - `GET {base}/accounts/{account}/identity` (access probe)
//! - `GET {base}/accounts/{account}/regions/{region}/db-instances[?next_token=..]`
//!
//! HTTP statuses and provider error codes are mapped onto [`ProviderError`]
//! so the retry and breaker layers can act on them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Page, ResourceLister, Session};
use crate::discovery::ProviderError;

/// Inventory endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Lister backed by the HTTP inventory API
pub struct HttpInventoryLister {
    http_client: Client,
    base_url: String,
}

impl HttpInventoryLister {
    pub fn new(config: &InventoryConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn identity_url(&self, account_id: &str) -> String {
        format!(
            "{}/accounts/{}/identity",
            self.base_url,
            urlencoding::encode(account_id)
        )
    }

    fn instances_url(&self, account_id: &str, region: &str, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/accounts/{}/regions/{}/db-instances",
            self.base_url,
            urlencoding::encode(account_id),
            urlencoding::encode(region)
        );
        if let Some(token) = page_token {
            url.push_str("?next_token=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    async fn get(&self, url: &str, session: &Session) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(session.bearer_token())
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[async_trait]
impl ResourceLister for HttpInventoryLister {
    fn name(&self) -> &str {
        "http-inventory"
    }

    async fn validate_access(&self, session: &Session) -> Result<(), ProviderError> {
        self.get(&self.identity_url(&session.account_id), session)
            .await
            .map(|_| ())
    }

    async fn list_page(
        &self,
        session: &Session,
        region: &str,
        page_token: Option<&str>,
    ) -> Result<Page, ProviderError> {
        let url = self.instances_url(&session.account_id, region, page_token);
        debug!(url = %url, "Fetching inventory page");

        let response = self.get(&url, session).await?;
        response
            .json::<Page>()
            .await
            .map_err(|e| ProviderError::Unclassified(format!("invalid inventory page: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "Code", alias = "error")]
    code: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Map a non-success response onto an error kind
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| format!("inventory API returned {}", status));

    match status.as_u16() {
        401 | 403 => ProviderError::AccessDenied(message),
        429 => ProviderError::Throttling(message),
        408 | 504 => ProviderError::Timeout(message),
        502 | 503 => ProviderError::TransientNetwork(message),
        _ => match parsed.and_then(|b| b.code) {
            Some(code) => ProviderError::from_code(&code, message),
            None => ProviderError::Unclassified(message),
        },
    }
}

/// Only failures before the request reached the API, or while streaming the
/// body, are transient; anything else in flight stays unclassified.
fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_body() {
        ProviderError::TransientNetwork(err.to_string())
    } else {
        ProviderError::Unclassified(err.to_string())
    }
}
