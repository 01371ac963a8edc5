//! Discovery error taxonomy
//!
//! Provider failures are a closed set of kinds. Retryability, severity,
//! remediation and whether a failure says anything about the health of the
//! remote dependency are all decided by matching on the kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::{BreakerError, Retryable};

/// Classified failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccessDenied,
    RegionNotEnabled,
    Throttling,
    Timeout,
    TransientNetwork,
    CircuitOpen,
    Unclassified,
    ExtractionError,
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::RegionNotEnabled => "region_not_enabled",
            ErrorKind::Throttling => "throttling",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Unclassified => "unclassified",
            ErrorKind::ExtractionError => "extraction_error",
            ErrorKind::Configuration => "configuration",
        };
        write!(f, "{}", name)
    }
}

/// How urgently an operator should look at an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Warning,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Warning => write!(f, "warning"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::AccessDenied | ErrorKind::Unclassified | ErrorKind::Configuration => {
                Severity::High
            }
            ErrorKind::Throttling
            | ErrorKind::Timeout
            | ErrorKind::TransientNetwork
            | ErrorKind::CircuitOpen => Severity::Medium,
            ErrorKind::RegionNotEnabled | ErrorKind::ExtractionError => Severity::Low,
        }
    }

    pub fn remediation_hint(self) -> &'static str {
        match self {
            ErrorKind::AccessDenied => {
                "Fix the credential or trust configuration for this account (role trust policy, credential reference)"
            }
            ErrorKind::RegionNotEnabled => {
                "Enable the region for this account or remove it from the configured region list"
            }
            ErrorKind::Throttling => {
                "Transient throttling; reduce scan concurrency or request a higher API rate limit if it persists"
            }
            ErrorKind::Timeout => {
                "The call did not finish in time; re-run the scan or raise the region timeout if it persists"
            }
            ErrorKind::TransientNetwork => {
                "Transient network failure; check connectivity to the provider endpoint if it persists"
            }
            ErrorKind::CircuitOpen => {
                "The dependency is failing repeatedly and calls are suspended; wait for it to recover"
            }
            ErrorKind::Unclassified => "Unexpected failure; inspect the engine logs for full context",
            ErrorKind::ExtractionError => {
                "The provider returned an unexpected record shape; the resource was kept with minimal metadata"
            }
            ErrorKind::Configuration => "Fix the discovery run configuration and re-run",
        }
    }

    /// Transient kinds the retry wrapper may absorb
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Throttling | ErrorKind::Timeout | ErrorKind::TransientNetwork
        )
    }

    /// Kinds that say the dependency itself is unhealthy. Access and region
    /// failures belong to one caller and do not count against a breaker.
    pub fn counts_against_dependency(self) -> bool {
        matches!(
            self,
            ErrorKind::Throttling
                | ErrorKind::Timeout
                | ErrorKind::TransientNetwork
                | ErrorKind::Unclassified
        )
    }
}

/// Failure reported by a provider capability (listing, credentials)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("region not enabled: {0}")]
    RegionNotEnabled(String),

    #[error("throttled: {0}")]
    Throttling(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("{0}")]
    Unclassified(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::AccessDenied(_) => ErrorKind::AccessDenied,
            ProviderError::RegionNotEnabled(_) => ErrorKind::RegionNotEnabled,
            ProviderError::Throttling(_) => ErrorKind::Throttling,
            ProviderError::Timeout(_) => ErrorKind::Timeout,
            ProviderError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            ProviderError::Unclassified(_) => ErrorKind::Unclassified,
        }
    }

    /// Classify a provider error code (as found in API error bodies)
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "AccessDenied" | "AccessDeniedException" | "UnauthorizedOperation"
            | "ExpiredToken" | "ExpiredTokenException" => ProviderError::AccessDenied(message),
            "Throttling" | "ThrottlingException" | "RequestLimitExceeded"
            | "TooManyRequestsException" => ProviderError::Throttling(message),
            "OptInRequired" | "InvalidClientTokenId" | "AuthFailure" | "RegionDisabled"
            | "UnrecognizedClientException" => ProviderError::RegionNotEnabled(message),
            "RequestTimeout" | "RequestTimeoutException" => ProviderError::Timeout(message),
            "ServiceUnavailable" | "InternalFailure" => ProviderError::TransientNetwork(message),
            _ => ProviderError::Unclassified(format!("{} ({})", message, code)),
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Failure of one protected outbound call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    /// Rejected by an open breaker; the provider was not contacted
    #[error("dependency '{dependency}' is unavailable (circuit open)")]
    CircuitOpen { dependency: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            CallError::Provider(e) => e.kind(),
        }
    }
}

impl Retryable for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            CallError::CircuitOpen { .. } => false,
            CallError::Provider(e) => e.is_retryable(),
        }
    }
}

impl From<BreakerError<ProviderError>> for CallError {
    fn from(err: BreakerError<ProviderError>) -> Self {
        match err {
            BreakerError::Open { name } => CallError::CircuitOpen { dependency: name },
            BreakerError::Inner(e) => CallError::Provider(e),
        }
    }
}
