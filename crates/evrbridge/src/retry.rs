//! Deadline and retry-with-restart around a single logical helper call.
//!
//! Every attempt starts from scratch: ensure a helper is running, re-send the
//! request, read and decode the reply. There is no resuming a half-finished
//! exchange; a failed attempt always costs a fresh helper.

use std::time::Duration;

use crate::bridge::protocol::Request;
use crate::error::{BridgeError, Result};
use crate::supervisor::HelperSupervisor;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);
pub const DEFAULT_STRAY_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, the first one included.
    pub max_attempts: u32,
    /// Bound on a single attempt, helper startup included.
    pub deadline: Duration,
    /// How long to wait for a failed helper's last stdout/stderr output.
    pub stray_grace: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: DEFAULT_DEADLINE,
            stray_grace: DEFAULT_STRAY_GRACE,
        }
    }
}

impl RetryPolicy {
    /// Run `request` against the supervised helper, decoding the reply with `decode`.
    ///
    /// `decode` sees the response line, or `""` for actions without a reply.
    pub async fn execute<T, D>(
        &self,
        supervisor: &mut HelperSupervisor,
        request: &Request,
        decode: D,
    ) -> Result<T>
    where
        D: Fn(&str) -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::time::timeout(self.deadline, async {
                supervisor.ensure_running().await?;
                tracing::debug!(action = request.action(), attempt, "Sending request to helper");
                let line = supervisor.exchange(request).await?;
                if let Some(ref line) = line {
                    tracing::debug!(action = request.action(), response = %line, "Got response from helper");
                }
                decode(line.as_deref().unwrap_or_default())
            })
            .await
            .unwrap_or_else(|_| Err(BridgeError::DeadlineExceeded(self.deadline)));

            let err = match outcome {
                Ok(value) => {
                    log_stray(&supervisor.drain_stray());
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    log_stray(&supervisor.drain_stray());
                    return Err(e);
                }
                Err(e) => e,
            };

            let output = supervisor.drain_stray_settled(self.stray_grace).await;

            if attempt < max_attempts {
                tracing::warn!(
                    action = request.action(),
                    attempt,
                    max_attempts,
                    error = %err,
                    "Helper call failed, restarting helper"
                );
                log_stray(&output);
                // The next attempt starts a fresh helper via ensure_running.
                supervisor.reap().await;
                continue;
            }

            tracing::error!(
                action = request.action(),
                attempts = attempt,
                error = %err,
                "Helper call failed, retries exhausted"
            );
            supervisor.reap().await;
            return Err(BridgeError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
                diagnostics: (!output.is_empty()).then_some(output),
            });
        }
    }
}

fn log_stray(output: &str) {
    if !output.is_empty() {
        tracing::debug!(output, "Discarding stdout/stderr output from helper");
    }
}
