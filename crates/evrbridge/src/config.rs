//! Bridge configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::error::{BridgeError, Result};
use crate::resolver::PathResolver;
use crate::retry::RetryPolicy;

pub const DEADLINE_ENV: &str = "EVRBRIDGE_DEADLINE_SECS";
pub const MAX_ATTEMPTS_ENV: &str = "EVRBRIDGE_MAX_ATTEMPTS";

/// How to launch the helper, minus the two descriptor arguments the
/// supervisor appends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl HelperCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `<interpreter> <script>`, with the interpreter picked by `resolver`.
    pub async fn resolve(
        resolver: &dyn PathResolver,
        candidates: &[&str],
        script: &Path,
    ) -> Result<Self> {
        let interpreter =
            resolver
                .resolve(candidates)
                .await
                .ok_or_else(|| BridgeError::HelperNotFound {
                    candidates: candidates.iter().map(|c| c.to_string()).collect(),
                })?;
        Ok(Self::new(interpreter).arg(script))
    }
}

pub struct BridgeConfig {
    pub helper: HelperCommand,
    pub policy: RetryPolicy,
    pub max_line_length: usize,
    /// Set on the helper's environment so its stray output arrives promptly.
    pub unbuffered_env: Option<(OsString, OsString)>,
}

impl BridgeConfig {
    pub fn new(helper: HelperCommand) -> Self {
        Self {
            helper,
            policy: RetryPolicy::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            unbuffered_env: Some(("PYTHONUNBUFFERED".into(), "1".into())),
        }
    }

    /// Defaults, overridden by `EVRBRIDGE_DEADLINE_SECS` and `EVRBRIDGE_MAX_ATTEMPTS`.
    pub fn from_env(helper: HelperCommand) -> Self {
        let mut config = Self::new(helper);
        if let Some(secs) = env_number::<u64>(DEADLINE_ENV) {
            config.policy.deadline = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_number::<u32>(MAX_ATTEMPTS_ENV) {
            config.policy.max_attempts = attempts;
        }
        config
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.policy.deadline = deadline;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    pub fn with_unbuffered_env(
        mut self,
        key: impl Into<OsString>,
        value: impl Into<OsString>,
    ) -> Self {
        self.unbuffered_env = Some((key.into(), value.into()));
        self
    }

    pub fn without_unbuffered_env(mut self) -> Self {
        self.unbuffered_env = None;
        self
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    parse_positive(&raw).or_else(|| {
        tracing::warn!(key, value = %raw, "Ignoring invalid numeric override");
        None
    })
}

fn parse_positive<T: std::str::FromStr>(raw: &str) -> Option<T> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.chars().all(|c| c == '0') {
        return None;
    }
    trimmed.parse().ok()
}
