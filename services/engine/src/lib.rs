//! Fleetscan Engine Library
//!
//! Resilient multi-account database discovery: accounts, regions and
//! records fail independently, and every run returns a result.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod providers;
pub mod resilience;
pub mod server;

pub use config::{ConfigError, DiscoveryConfig};
pub use discovery::{DiscoveryOrchestrator, DiscoveryResult};
pub use engine::{run_from_path, Engine};
