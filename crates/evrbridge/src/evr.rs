//! Epoch/version/release handling.
//!
//! The helper filters on decomposed EVR fields, so the host splits a
//! `[EPOCH:]VERSION[-RELEASE]` string before sending a query. Nothing else
//! about package versions is interpreted on this side: ordering is always
//! delegated to the helper.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Decomposed package version.
///
/// Decoded helper responses may carry any combination of absent fields.
/// Specs produced by [`VersionSpec::parse`] always have `version` set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

impl VersionSpec {
    pub fn new(
        epoch: Option<String>,
        version: Option<String>,
        release: Option<String>,
    ) -> Self {
        Self {
            epoch,
            version,
            release,
        }
    }

    /// Split `[EPOCH:]VERSION[-RELEASE]` into its components.
    ///
    /// The last separator wins, and a separator only counts when both sides
    /// are non-empty: `1.2-3-4` is version `1.2-3` release `4`, and `-1` is a
    /// bare version.
    pub fn parse(raw: &str) -> Self {
        let (epoch, rest) = match split_last(raw, ':') {
            Some((epoch, rest)) => (Some(epoch.to_string()), rest),
            None => (None, raw),
        };
        let (version, release) = match split_last(rest, '-') {
            Some((version, release)) => (version, Some(release.to_string())),
            None => (rest, None),
        };

        Self {
            epoch,
            version: Some(version.to_string()),
            release,
        }
    }
}

fn split_last(s: &str, sep: char) -> Option<(&str, &str)> {
    let idx = s
        .rmatch_indices(sep)
        .map(|(i, _)| i)
        .find(|&i| i > 0 && i + sep.len_utf8() < s.len())?;
    Some((&s[..idx], &s[idx + sep.len_utf8()..]))
}

/// Renders in `[EPOCH:]VERSION[-RELEASE]` form, the inverse of [`VersionSpec::parse`].
impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref epoch) = self.epoch {
            write!(f, "{epoch}:")?;
        }
        if let Some(ref version) = self.version {
            f.write_str(version)?;
        }
        if let Some(ref release) = self.release {
            write!(f, "-{release}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(epoch: Option<&str>, version: &str, release: Option<&str>) -> VersionSpec {
        VersionSpec::new(
            epoch.map(str::to_string),
            Some(version.to_string()),
            release.map(str::to_string),
        )
    }

    #[test]
    fn parse_full_evr() {
        assert_eq!(VersionSpec::parse("2:1.2-3"), spec(Some("2"), "1.2", Some("3")));
    }

    #[test]
    fn parse_version_only() {
        assert_eq!(VersionSpec::parse("1.2"), spec(None, "1.2", None));
    }

    #[test]
    fn parse_version_release() {
        assert_eq!(VersionSpec::parse("1.2-3"), spec(None, "1.2", Some("3")));
    }

    #[test]
    fn parse_epoch_version() {
        assert_eq!(VersionSpec::parse("1:4.0"), spec(Some("1"), "4.0", None));
    }

    #[test]
    fn parse_splits_on_last_hyphen() {
        assert_eq!(
            VersionSpec::parse("1.2-3-4.el7"),
            spec(None, "1.2-3", Some("4.el7"))
        );
    }

    #[test]
    fn parse_ignores_dangling_separators() {
        assert_eq!(VersionSpec::parse("1.2-"), spec(None, "1.2-", None));
        assert_eq!(VersionSpec::parse(":1.2"), spec(None, ":1.2", None));
        assert_eq!(VersionSpec::parse("-1"), spec(None, "-1", None));
    }

    #[test]
    fn parse_always_sets_version() {
        for raw in ["", "1", "0:1-1", "a:b:c-d"] {
            assert!(VersionSpec::parse(raw).version.is_some(), "{raw}");
        }
    }

    #[test]
    fn display_inverts_parse() {
        for raw in ["2:1.2-3", "1.2", "1.2-3", "1:4.0"] {
            assert_eq!(VersionSpec::parse(raw).to_string(), raw);
        }
    }
}
