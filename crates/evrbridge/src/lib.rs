//! evrbridge: package-version queries delegated to a supervised helper process.
//!
//! The host talks to one long-lived helper over a private pipe pair, one JSON
//! request line out and one whitespace-token line back. The helper is started
//! on first use and restarted transparently when it crashes, hangs or answers
//! with garbage, within a bounded retry budget.

#[cfg(not(unix))]
compile_error!("evrbridge passes pipe descriptors to its helper and only supports unix");

pub mod bridge;
pub mod config;
pub mod error;
pub mod evr;
pub mod global;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod supervisor;
mod version;

#[cfg(test)]
mod test_support;

pub use bridge::protocol::{FLUSH_CACHE, VERSION_COMPARE, WHAT_AVAILABLE, WHAT_INSTALLED};
pub use config::{BridgeConfig, HelperCommand};
pub use error::{BridgeError, Result};
pub use evr::VersionSpec;
pub use resolver::{CommandRunner, PYTHON_CANDIDATES, PathResolver, ProbingResolver};
pub use retry::RetryPolicy;
pub use service::HelperBridge;
pub use supervisor::SessionState;
pub use version::BRIDGE_VERSION;
