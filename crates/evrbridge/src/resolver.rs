//! Interpreter discovery for the helper.
//!
//! The bridge never searches for an interpreter itself; it is handed a
//! [`HelperCommand`](crate::config::HelperCommand). These traits are the seam
//! the command is built through, with a PATH-searching default.

use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// Interpreters tried in order by [`ProbingResolver::python`].
pub const PYTHON_CANDIDATES: &[&str] = &["python", "python2", "python2.7"];

/// Probe proving the interpreter can load the package-database bindings.
pub const YUM_PROBE: &[&str] = &["-c", "import yum"];

/// Runs a probe command and reports whether it exited successfully.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn succeeds(&self, program: &Path, args: &[String]) -> bool;
}

/// Runs probes as real subprocesses with all stdio discarded.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn succeeds(&self, program: &Path, args: &[String]) -> bool {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::debug!(program = %program.display(), error = %e, "Probe failed to run");
                false
            }
        }
    }
}

/// Picks the first of a set of candidate executables that is usable.
#[async_trait]
pub trait PathResolver: Send + Sync {
    async fn resolve(&self, candidates: &[&str]) -> Option<PathBuf>;
}

/// Searches `PATH` for each candidate and accepts the first whose probe succeeds.
pub struct ProbingResolver<R = ProcessRunner> {
    probe: Vec<String>,
    runner: R,
    search_path: Option<OsString>,
}

impl ProbingResolver<ProcessRunner> {
    pub fn new(probe: &[&str]) -> Self {
        Self::with_runner(probe, ProcessRunner)
    }

    /// Resolver for a Python interpreter that can `import yum`.
    pub fn python() -> Self {
        Self::new(YUM_PROBE)
    }
}

impl<R: CommandRunner> ProbingResolver<R> {
    pub fn with_runner(probe: &[&str], runner: R) -> Self {
        Self {
            probe: probe.iter().map(|s| s.to_string()).collect(),
            runner,
            search_path: None,
        }
    }

    /// Search this list of directories instead of the process `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    fn which(&self, candidate: &str) -> Option<PathBuf> {
        if candidate.contains('/') {
            let path = PathBuf::from(candidate);
            return is_executable(&path).then_some(path);
        }

        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))?;
        std::env::split_paths(&search_path)
            .map(|dir| dir.join(candidate))
            .find(|path| is_executable(path))
    }
}

#[async_trait]
impl<R: CommandRunner> PathResolver for ProbingResolver<R> {
    async fn resolve(&self, candidates: &[&str]) -> Option<PathBuf> {
        for candidate in candidates {
            let Some(path) = self.which(candidate) else {
                tracing::trace!(candidate, "Not found on PATH");
                continue;
            };
            if self.runner.succeeds(&path, &self.probe).await {
                tracing::debug!(path = %path.display(), "Resolved helper interpreter");
                return Some(path);
            }
            tracing::debug!(path = %path.display(), probe = ?self.probe, "Probe rejected interpreter");
        }
        None
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
