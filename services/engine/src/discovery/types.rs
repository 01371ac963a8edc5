//! Discovery Types
//!
//! Core types for describing accounts, discovered resources and the
//! outcome of a discovery run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::error::{ErrorKind, Severity};

/// One cloud account to scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    /// Provider account identifier
    pub id: String,
    /// Human-readable name, used only in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Reference the credential provider resolves into a session
    pub credential_ref: String,
    /// Regions to scan instead of the run defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
}

impl AccountDescriptor {
    pub fn new(id: impl Into<String>, credential_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            credential_ref: credential_ref.into(),
            regions: None,
        }
    }

    /// Override the run's default regions for this account
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    /// Regions to scan: the override when present, else the defaults
    pub fn resolve_regions(&self, defaults: &[String]) -> Vec<String> {
        self.regions.clone().unwrap_or_else(|| defaults.to_vec())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Which rule produced an environment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Tag,
    ManualMapping,
    AccountMapping,
    NamingPattern,
    Default,
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationSource::Tag => write!(f, "tag"),
            ClassificationSource::ManualMapping => write!(f, "manual_mapping"),
            ClassificationSource::AccountMapping => write!(f, "account_mapping"),
            ClassificationSource::NamingPattern => write!(f, "naming_pattern"),
            ClassificationSource::Default => write!(f, "default"),
        }
    }
}

/// Network endpoint of a database instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Database-specific attributes; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseAttributes {
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub instance_class: Option<String>,
    pub status: Option<String>,
    pub endpoint: Option<Endpoint>,
    pub vpc_id: Option<String>,
    pub subnet_group: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub multi_az: Option<bool>,
    pub storage_encrypted: Option<bool>,
    pub allocated_storage_gb: Option<u64>,
}

/// Label every record carries until the classifier runs
pub const UNCLASSIFIED_LABEL: &str = "unknown";

/// Normalized description of one discovered resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub account_id: String,
    pub region: String,
    pub type_attributes: DatabaseAttributes,
    pub tags: BTreeMap<String, String>,
    pub environment_label: String,
    pub classification_source: ClassificationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

impl ResourceRecord {
    /// Record with only identity fields populated
    pub fn minimal(
        id: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            region: region.into(),
            type_attributes: DatabaseAttributes::default(),
            tags: BTreeMap::new(),
            environment_label: UNCLASSIFIED_LABEL.to_string(),
            classification_source: ClassificationSource::Default,
            extraction_error: None,
        }
    }

    pub fn with_extraction_error(mut self, error: impl Into<String>) -> Self {
        self.extraction_error = Some(error.into());
        self
    }
}

/// Level at which an error was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorScope {
    Account,
    Region,
    Item,
    Configuration,
}

impl std::fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorScope::Account => write!(f, "account"),
            ErrorScope::Region => write!(f, "region"),
            ErrorScope::Item => write!(f, "item"),
            ErrorScope::Configuration => write!(f, "configuration"),
        }
    }
}

/// Structured failure captured during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryError {
    pub scope: ErrorScope,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub error_kind: ErrorKind,
    pub message: String,
    pub remediation_hint: String,
    pub severity: Severity,
}

impl DiscoveryError {
    fn new(
        scope: ErrorScope,
        account_id: &str,
        region: Option<&str>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            account_id: account_id.to_string(),
            region: region.map(str::to_string),
            error_kind: kind,
            message: message.into(),
            remediation_hint: kind.remediation_hint().to_string(),
            severity: kind.severity(),
        }
    }

    /// Account-level failure; always high severity
    pub fn account(account_id: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Account, account_id, None, kind, message).with_severity(Severity::High)
    }

    pub fn region(
        account_id: &str,
        region: &str,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorScope::Region, account_id, Some(region), kind, message)
    }

    /// A region task cancelled by its timeout
    pub fn region_timeout(account_id: &str, region: &str, timeout: std::time::Duration) -> Self {
        Self::region(
            account_id,
            region,
            ErrorKind::Timeout,
            format!("region scan exceeded {}s timeout and was cancelled", timeout.as_secs()),
        )
        .with_severity(Severity::Warning)
    }

    /// A record that was kept with degraded metadata
    pub fn item(record: &ResourceRecord, message: impl Into<String>) -> Self {
        Self::new(
            ErrorScope::Item,
            &record.account_id,
            Some(&record.region),
            ErrorKind::ExtractionError,
            format!("{}: {}", record.id, message.into()),
        )
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Configuration, "", None, ErrorKind::Configuration, message)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Outcome of one discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub resources: Vec<ResourceRecord>,
    pub errors: Vec<DiscoveryError>,
    pub accounts_attempted: usize,
    pub accounts_scanned: usize,
    pub regions_scanned: usize,
    /// `None` when no account was attempted
    pub success_rate: Option<f64>,
}

/// Aggregate counts over a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub resources_by_environment: BTreeMap<String, usize>,
    pub errors_by_kind: BTreeMap<String, usize>,
    pub degraded_records: usize,
}

impl DiscoveryResult {
    /// Empty result for a run starting now
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            resources: Vec::new(),
            errors: Vec::new(),
            accounts_attempted: 0,
            accounts_scanned: 0,
            regions_scanned: 0,
            success_rate: None,
        }
    }

    /// Stamp the finish time and derive the success rate
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self.success_rate = success_rate(self.accounts_scanned, self.accounts_attempted);
        self
    }

    /// Result of a run whose configuration could not be loaded
    pub fn configuration_failure(message: impl Into<String>) -> Self {
        let mut result = Self::begin();
        result.errors.push(DiscoveryError::configuration(message));
        result.finish()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> DiscoverySummary {
        let mut summary = DiscoverySummary::default();
        for resource in &self.resources {
            *summary
                .resources_by_environment
                .entry(resource.environment_label.clone())
                .or_default() += 1;
            if resource.extraction_error.is_some() {
                summary.degraded_records += 1;
            }
        }
        for error in &self.errors {
            *summary
                .errors_by_kind
                .entry(error.error_kind.to_string())
                .or_default() += 1;
        }
        summary
    }

    /// Format the result for display
    pub fn display(&self) -> String {
        let rate = self
            .success_rate
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string());

        let mut out = format!(
            "Discovery run {}:\n  Accounts: {}/{} scanned ({})\n  Regions scanned: {}\n  Resources: {}\n  Errors: {}",
            self.run_id,
            self.accounts_scanned,
            self.accounts_attempted,
            rate,
            self.regions_scanned,
            self.resources.len(),
            self.errors.len()
        );
        for (env, count) in self.summary().resources_by_environment {
            out.push_str(&format!("\n    {}: {}", env, count));
        }
        for error in &self.errors {
            out.push_str(&format!(
                "\n  [{}] {} {}{}: {} (hint: {})",
                error.severity,
                error.scope,
                error.account_id,
                error
                    .region
                    .as_deref()
                    .map(|r| format!("/{}", r))
                    .unwrap_or_default(),
                error.message,
                error.remediation_hint
            ));
        }
        out
    }
}

/// `scanned / attempted`, undefined for zero attempts
pub fn success_rate(scanned: usize, attempted: usize) -> Option<f64> {
    if attempted == 0 {
        None
    } else {
        Some(scanned as f64 / attempted as f64)
    }
}
