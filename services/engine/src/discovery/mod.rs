//! Multi-Account Discovery
//!
//! Enumerates database instances across many cloud accounts and regions
//! and returns one [`DiscoveryResult`] per run, however badly individual
//! accounts, regions or records behave.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │  DiscoveryOrchestrator   │  accounts, sequential
//! └────────────┬─────────────┘
//!              │ per account: credentials + access probe
//!              ▼
//! ┌──────────────────────────┐
//! │      RegionScanner       │  regions, worker pool + per-region timeout
//! └────────────┬─────────────┘
//!              ▼
//! ┌──────────────────────────┐
//! │   ResourceEnumerator     │  pages: retry -> circuit breaker -> lister
//! └────────────┬─────────────┘
//!              ▼
//!   extractor -> classifier -> ResourceRecord
//! ```

pub mod classifier;
pub mod enumerator;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod scanner;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use classifier::{ClassificationConfig, EnvironmentClassifier, NamePattern, NamingRule};
pub use enumerator::{protected_call, ResourceEnumerator, LIST_RESOURCES, VALIDATE_ACCESS};
pub use error::{CallError, ErrorKind, ProviderError, Severity};
pub use extractor::extract;
pub use orchestrator::DiscoveryOrchestrator;
pub use scanner::{PoolError, RegionScan, RegionScanner, ScannerConfig, WorkerPool};
pub use types::{
    success_rate, AccountDescriptor, ClassificationSource, DatabaseAttributes, DiscoveryError,
    DiscoveryResult, DiscoverySummary, Endpoint, ErrorScope, ResourceRecord,
};
