//! Version information for evrbridge.

/// evrbridge version from Cargo.toml
pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver_like() {
        assert_eq!(BRIDGE_VERSION.split('.').count(), 3);
    }
}
