//! Error types for the helper bridge.

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Broken pipe, end-of-stream on the response pipe, or the helper is gone.
    #[error("helper transport broken: {0}")]
    TransportBroken(#[source] io::Error),

    #[error("helper call exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// Response line did not have the shape the request expects.
    #[error("malformed helper response {line:?}: {reason}")]
    ProtocolMalformed { line: String, reason: String },

    /// Pipe allocation or process spawn failed.
    #[error("failed to spawn helper: {0}")]
    Spawn(#[source] io::Error),

    #[error("no usable interpreter found among {candidates:?}")]
    HelperNotFound { candidates: Vec<String> },

    /// Transport failures persisted past the retry budget.
    #[error(
        "helper failed after {attempts} attempts: {last}{}",
        diagnostics_suffix(.diagnostics.as_deref())
    )]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<BridgeError>,
        /// Stray stdout/stderr text captured from the helper, if any.
        diagnostics: Option<String>,
    },
}

fn diagnostics_suffix(diagnostics: Option<&str>) -> String {
    match diagnostics {
        Some(text) => format!("\n\nhelper had stderr/stdout output:\n\n{text}"),
        None => String::new(),
    }
}

impl BridgeError {
    pub fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProtocolMalformed {
            line: line.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn end_of_stream() -> Self {
        Self::TransportBroken(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "helper closed the response pipe",
        ))
    }

    /// Whether a restart of the helper can plausibly fix this failure.
    ///
    /// Spawn failures are not retried: the same spawn would fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportBroken(_) | Self::DeadlineExceeded(_) | Self::ProtocolMalformed { .. }
        )
    }

    /// Captured helper output attached to an exhausted call.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::RetriesExhausted { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
