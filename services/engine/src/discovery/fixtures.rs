//! Scripted providers for discovery tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::error::ProviderError;
use super::types::AccountDescriptor;
use crate::providers::{CredentialProvider, Page, ResourceLister, Session};

/// Raw instance payload with the usual fields populated
pub fn instance(id: &str) -> Value {
    json!({
        "DBInstanceIdentifier": id,
        "Engine": "postgres",
        "EngineVersion": "15.4",
        "DBInstanceClass": "db.t3.medium",
        "DBInstanceStatus": "available",
        "Endpoint": {"Address": format!("{}.internal", id), "Port": 5432},
        "TagList": []
    })
}

/// Instance payload carrying an `Environment` tag
pub fn tagged_instance(id: &str, environment: &str) -> Value {
    let mut raw = instance(id);
    raw["TagList"] = json!([{"Key": "Environment", "Value": environment}]);
    raw
}

/// Behaviour of one account/region listing
#[derive(Debug, Clone)]
pub enum RegionScript {
    /// Successive pages; the last one carries no token
    Pages(Vec<Vec<Value>>),
    /// Every call fails
    Fail(ProviderError),
    /// The first `failures` calls fail, then pages are served
    FlakyThen {
        failures: usize,
        error: ProviderError,
        pages: Vec<Vec<Value>>,
    },
    /// Every page points back at the same continuation token
    Looping(Vec<Value>),
    /// Never returns
    Hang,
    Panic,
}

#[derive(Default)]
pub struct ScriptedLister {
    regions: HashMap<(String, String), RegionScript>,
    denied_access: HashMap<String, ProviderError>,
    calls: Mutex<HashMap<(String, String), usize>>,
    access_checks: Mutex<HashMap<String, usize>>,
}

impl ScriptedLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, account_id: &str, region: &str, script: RegionScript) -> Self {
        self.regions
            .insert((account_id.to_string(), region.to_string()), script);
        self
    }

    /// Fail the access probe for `account_id`
    pub fn deny_access(mut self, account_id: &str, error: ProviderError) -> Self {
        self.denied_access.insert(account_id.to_string(), error);
        self
    }

    /// Number of `list_page` calls made for an account/region
    pub fn calls(&self, account_id: &str, region: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(account_id.to_string(), region.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// `list_page` calls across every account and region
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Number of `validate_access` calls made for an account
    pub fn access_checks(&self, account_id: &str) -> usize {
        self.access_checks
            .lock()
            .unwrap()
            .get(account_id)
            .copied()
            .unwrap_or(0)
    }

    fn record_call(&self, key: &(String, String)) -> usize {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(key.clone()).or_default();
        *count += 1;
        *count
    }
}

fn serve(pages: &[Vec<Value>], token: Option<&str>) -> Page {
    let index = token
        .and_then(|t| t.strip_prefix("page-"))
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);
    let items = pages.get(index).cloned().unwrap_or_default();
    if index + 1 < pages.len() {
        Page::with_next(items, format!("page-{}", index + 1))
    } else {
        Page::last(items)
    }
}

#[async_trait]
impl ResourceLister for ScriptedLister {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn validate_access(&self, session: &Session) -> Result<(), ProviderError> {
        *self
            .access_checks
            .lock()
            .unwrap()
            .entry(session.account_id.clone())
            .or_default() += 1;

        match self.denied_access.get(&session.account_id) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn list_page(
        &self,
        session: &Session,
        region: &str,
        page_token: Option<&str>,
    ) -> Result<Page, ProviderError> {
        let key = (session.account_id.clone(), region.to_string());
        let call = self.record_call(&key);

        match self.regions.get(&key).cloned() {
            None => Ok(Page::last(Vec::new())),
            Some(RegionScript::Pages(pages)) => Ok(serve(&pages, page_token)),
            Some(RegionScript::Fail(err)) => Err(err),
            Some(RegionScript::FlakyThen {
                failures,
                error,
                pages,
            }) => {
                if call <= failures {
                    Err(error)
                } else {
                    Ok(serve(&pages, page_token))
                }
            }
            Some(RegionScript::Looping(items)) => Ok(Page::with_next(items, "loop")),
            Some(RegionScript::Hang) => std::future::pending().await,
            Some(RegionScript::Panic) => panic!("scripted lister panic in {}", region),
        }
    }
}

/// Hands out token sessions; listed credential refs are refused
#[derive(Default)]
pub struct StaticCredentials {
    denied: HashSet<String>,
    panicking: HashSet<String>,
    expired: HashSet<String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, credential_ref: &str) -> Self {
        self.denied.insert(credential_ref.to_string());
        self
    }

    pub fn panic_on(mut self, credential_ref: &str) -> Self {
        self.panicking.insert(credential_ref.to_string());
        self
    }

    /// Hand out a session whose lifetime has already run out
    pub fn expired(mut self, credential_ref: &str) -> Self {
        self.expired.insert(credential_ref.to_string());
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_credentials(&self, account: &AccountDescriptor) -> Result<Session, ProviderError> {
        if self.panicking.contains(&account.credential_ref) {
            panic!("credential store exploded for {}", account.id);
        }
        if self.denied.contains(&account.credential_ref) {
            return Err(ProviderError::AccessDenied(format!(
                "role {} cannot be assumed",
                account.credential_ref
            )));
        }
        let session = Session::with_token(&account.id, "test-token");
        if self.expired.contains(&account.credential_ref) {
            return Ok(session.expiring_in(Duration::ZERO));
        }
        Ok(session)
    }
}
