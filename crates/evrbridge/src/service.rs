//! HelperBridge: the public face of the bridge.
//!
//! Owns one supervised helper behind an async mutex. Every call holds the lock
//! for its whole duration, retries included, so only one request is ever on
//! the pipe pair. The helper is started lazily by the first call.

use tokio::sync::Mutex;

use crate::bridge::protocol::{Request, parse_comparison, parse_query};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::evr::VersionSpec;
use crate::retry::RetryPolicy;
use crate::supervisor::{HelperSupervisor, SessionState};

pub struct HelperBridge {
    supervisor: Mutex<HelperSupervisor>,
    policy: RetryPolicy,
}

impl HelperBridge {
    /// Create a bridge. Nothing is spawned until the first call.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            supervisor: Mutex::new(HelperSupervisor::new(&config)),
            policy: config.policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Three-way comparison of two version strings, as ordered by the helper.
    pub async fn compare_versions(&self, v1: &str, v2: &str) -> Result<i32> {
        self.call(Request::version_compare(v1, v2), parse_comparison)
            .await
    }

    /// Look up the package providing `provides`.
    ///
    /// `version` is split into epoch, version and release before it is sent.
    /// `Ok(None)` means the helper found no match.
    pub async fn query(
        &self,
        action: impl Into<String>,
        provides: &str,
        version: Option<&str>,
        arch: Option<&str>,
    ) -> Result<Option<VersionSpec>> {
        self.call(Request::query(action, provides, version, arch), parse_query)
            .await
    }

    /// Ask the helper to drop its cached package metadata. There is no reply.
    pub async fn flush_cache(&self) -> Result<()> {
        self.call(Request::flush_cache(), |_| Ok(())).await
    }

    async fn call<T, D>(&self, request: Request, decode: D) -> Result<T>
    where
        D: Fn(&str) -> Result<T>,
    {
        if tracing::enabled!(tracing::Level::DEBUG)
            && let Ok(line) = request.to_line()
        {
            tracing::debug!(request = %line, "Bridge call");
        }

        let mut supervisor = self.supervisor.lock().await;
        self.policy.execute(&mut supervisor, &request, decode).await
    }

    /// Replace the helper with a fresh process.
    pub async fn restart(&self) -> Result<()> {
        self.supervisor.lock().await.restart().await
    }

    /// Kill and reap the helper. The next call starts a new one.
    pub async fn reap(&self) {
        self.supervisor.lock().await.reap().await;
    }

    pub async fn state(&self) -> SessionState {
        self.supervisor.lock().await.state()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.supervisor.lock().await.pid()
    }

    /// Number of helper processes spawned so far.
    pub async fn starts(&self) -> u64 {
        self.supervisor.lock().await.starts()
    }

    pub async fn shutdown(&self) {
        tracing::debug!("Shutting down helper bridge");
        self.reap().await;
    }
}
