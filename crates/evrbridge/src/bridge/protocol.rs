//! Wire protocol types for host-helper communication.
//!
//! Requests are one line of compact JSON. Responses are one line of plain
//! text whose shape depends on the request:
//! - **versioncompare**: a bare signed integer
//! - **query actions**: whitespace tokens in groups of three (epoch, version,
//!   release), `nil` marking an absent field
//! - **flushcache**: no response at all

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::evr::VersionSpec;

pub const VERSION_COMPARE: &str = "versioncompare";
pub const WHAT_INSTALLED: &str = "whatinstalled";
pub const WHAT_AVAILABLE: &str = "whatavailable";
pub const FLUSH_CACHE: &str = "flushcache";

/// Token the helper uses for an absent EVR field.
pub const ABSENT: &str = "nil";

/// Messages from host to helper.
///
/// Untagged because query actions are caller-chosen strings; variants are
/// distinguished by their required fields (`versions`, `provides`) and tried
/// in declaration order when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Request {
    VersionCompare {
        action: String,
        versions: [String; 2],
    },

    Query(QueryRequest),

    /// Action-only control message. The helper does not reply.
    Control { action: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub action: String,
    pub provides: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl Request {
    pub fn version_compare(v1: impl Into<String>, v2: impl Into<String>) -> Self {
        Self::VersionCompare {
            action: VERSION_COMPARE.to_string(),
            versions: [v1.into(), v2.into()],
        }
    }

    /// Build a package query, decomposing `version` into EVR fields.
    pub fn query(
        action: impl Into<String>,
        provides: impl Into<String>,
        version: Option<&str>,
        arch: Option<&str>,
    ) -> Self {
        let evr = version.map(VersionSpec::parse).unwrap_or_default();
        Self::Query(QueryRequest {
            action: action.into(),
            provides: provides.into(),
            epoch: evr.epoch,
            version: evr.version,
            release: evr.release,
            arch: arch.map(str::to_string),
        })
    }

    pub fn flush_cache() -> Self {
        Self::Control {
            action: FLUSH_CACHE.to_string(),
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Self::VersionCompare { action, .. } => action,
            Self::Query(q) => &q.action,
            Self::Control { action } => action,
        }
    }

    /// Whether the helper writes a response line for this request.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::Control { .. })
    }

    /// Serialize to the single-line wire form (without the trailing newline).
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            BridgeError::malformed(format!("{self:?}"), format!("request encoding failed: {e}"))
        })
    }
}

/// Decode a versioncompare response: the whole line is a signed integer.
pub fn parse_comparison(line: &str) -> Result<i32> {
    let trimmed = line.trim();
    trimmed
        .parse::<i32>()
        .map_err(|e| BridgeError::malformed(line, format!("expected integer: {e}")))
}

/// Decode a query response into its first EVR record.
///
/// No tokens means no match. Tokens past the first record are ignored, but
/// fewer than one whole record is rejected rather than padded.
pub fn parse_query(line: &str) -> Result<Option<VersionSpec>> {
    let tokens: Vec<Option<String>> = line
        .split_whitespace()
        .map(|t| (t != ABSENT).then(|| t.to_string()))
        .collect();

    if (1..3).contains(&tokens.len()) {
        return Err(BridgeError::malformed(
            line,
            format!("expected a record of 3 tokens, got {}", tokens.len()),
        ));
    }

    Ok(tokens.chunks_exact(3).next().map(|record| {
        VersionSpec::new(record[0].clone(), record[1].clone(), record[2].clone())
    }))
}
