//! Helper supervisor - owns the helper process and its pipes.
//!
//! Flow:
//! 1. Allocate the request and response pipes (close-on-exec)
//! 2. Duplicate the two helper-facing ends so only they are inherited
//! 3. Spawn `<program> <args...> <request_fd> <response_fd>`
//! 4. Close the parent's copies of the helper-facing ends
//! 5. On reap: SIGKILL, close the host streams, wait for the exit status

use std::ffi::OsString;
use std::io;
use std::os::fd::AsRawFd;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, dup, pipe2};
use tokio::process::{Child, Command};

use crate::bridge::protocol::Request;
use crate::bridge::transport::HelperTransport;
use crate::config::{BridgeConfig, HelperCommand};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never started.
    Idle,
    Running,
    /// Exited, broken or reaped; the next call restarts it.
    Dead,
}

struct HelperProcess {
    child: Child,
    pid: u32,
    transport: HelperTransport,
    /// Set while a request is on the wire. Still set at the start of the next
    /// call means the previous one was abandoned and a reply may be pending.
    in_flight: bool,
}

pub struct HelperSupervisor {
    helper: HelperCommand,
    unbuffered_env: Option<(OsString, OsString)>,
    max_line_length: usize,
    state: SessionState,
    process: Option<HelperProcess>,
    starts: u64,
}

impl HelperSupervisor {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            helper: config.helper.clone(),
            unbuffered_env: config.unbuffered_env.clone(),
            max_line_length: config.max_line_length,
            state: SessionState::Idle,
            process: None,
            starts: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pid of the current helper, if one has been spawned and not reaped.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.pid)
    }

    /// Number of helper processes spawned over this supervisor's lifetime.
    pub fn starts(&self) -> u64 {
        self.starts
    }

    /// Spawn the helper. Refuses while a helper process is still held; use
    /// [`restart`](Self::restart) to replace one.
    pub(crate) fn start(&mut self) -> Result<()> {
        if let Some(process) = &self.process {
            return Err(BridgeError::Spawn(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("helper {} has not been reaped", process.pid),
            )));
        }

        let (request_read, request_write) = pipe2(OFlag::O_CLOEXEC).map_err(spawn_error)?;
        let (response_read, response_write) = pipe2(OFlag::O_CLOEXEC).map_err(spawn_error)?;

        // dup() never sets FD_CLOEXEC, so these copies are the only pipe ends
        // the helper inherits.
        let helper_read = dup(&request_read).map_err(spawn_error)?;
        let helper_write = dup(&response_write).map_err(spawn_error)?;
        drop(request_read);
        drop(response_write);

        let mut cmd = Command::new(&self.helper.program);
        cmd.args(&self.helper.args)
            .arg(helper_read.as_raw_fd().to_string())
            .arg(helper_write.as_raw_fd().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some((key, value)) = &self.unbuffered_env {
            cmd.env(key, value);
        }

        tracing::debug!(
            program = %self.helper.program.display(),
            request_fd = helper_read.as_raw_fd(),
            response_fd = helper_write.as_raw_fd(),
            "Spawning helper"
        );
        let spawned = cmd.spawn();

        // The parent must not hold the helper's ends, or a dead helper never
        // shows up as EOF/EPIPE on our side.
        drop(helper_read);
        drop(helper_write);

        let mut child = spawned.map_err(BridgeError::Spawn)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Spawn(io::Error::other("helper stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::Spawn(io::Error::other("helper stderr not captured")))?;
        let pid = child
            .id()
            .ok_or_else(|| BridgeError::Spawn(io::Error::other("helper exited during spawn")))?;

        let transport = HelperTransport::new(
            request_write,
            response_read,
            stdout,
            stderr,
            self.max_line_length,
        )
        .map_err(BridgeError::Spawn)?;

        self.process = Some(HelperProcess {
            child,
            pid,
            transport,
            in_flight: false,
        });
        self.state = SessionState::Running;
        self.starts += 1;

        tracing::info!(pid, starts = self.starts, "Helper started");
        Ok(())
    }

    /// Start the helper unless a healthy one is already running.
    pub async fn ensure_running(&mut self) -> Result<()> {
        let abandoned = self.process.as_ref().is_some_and(|p| p.in_flight);
        match self.state {
            SessionState::Running if !abandoned => Ok(()),
            SessionState::Running => {
                tracing::warn!(pid = ?self.pid(), "Previous call abandoned mid-exchange, restarting helper");
                self.restart().await
            }
            SessionState::Idle | SessionState::Dead => {
                self.reap().await;
                self.start()
            }
        }
    }

    /// Kill the helper, close its streams and collect its exit status.
    ///
    /// Safe to call repeatedly; always leaves the session `Dead`.
    pub async fn reap(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Some(pid) = process.child.id() {
                terminate(pid);
            }
            process.transport.close();
            drop(process.transport);

            match process.child.wait().await {
                Ok(status) => tracing::debug!(pid = process.pid, %status, "Helper reaped"),
                Err(e) => tracing::warn!(pid = process.pid, error = %e, "Failed to wait for helper"),
            }
        }
        self.state = SessionState::Dead;
    }

    pub async fn restart(&mut self) -> Result<()> {
        self.reap().await;
        self.start()
    }

    /// Send one request and, if the action has one, read its response line.
    pub async fn exchange(&mut self, request: &Request) -> Result<Option<String>> {
        let process = self
            .process
            .as_mut()
            .filter(|_| self.state == SessionState::Running)
            .ok_or_else(|| {
                BridgeError::TransportBroken(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "helper is not running",
                ))
            })?;

        process.in_flight = true;
        let result = async {
            process.transport.write_line(request.clone()).await?;
            if request.expects_response() {
                process.transport.read_line().await.map(Some)
            } else {
                Ok(None)
            }
        }
        .await;

        match result {
            Ok(line) => {
                process.in_flight = false;
                Ok(line)
            }
            Err(e) => {
                self.state = SessionState::Dead;
                Err(e)
            }
        }
    }

    pub fn drain_stray(&mut self) -> String {
        self.process
            .as_mut()
            .map(|p| p.transport.drain_stray())
            .unwrap_or_default()
    }

    pub async fn drain_stray_settled(&mut self, grace: Duration) -> String {
        match self.process.as_mut() {
            Some(p) => p.transport.drain_stray_settled(grace).await,
            None => String::new(),
        }
    }
}

fn spawn_error(errno: Errno) -> BridgeError {
    BridgeError::Spawn(io::Error::from(errno))
}

/// Best-effort SIGKILL. The helper being gone already is the expected case.
fn terminate(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "Failed to signal helper"),
    }
}
