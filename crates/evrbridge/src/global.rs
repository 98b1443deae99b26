//! Process-wide bridge instance.
//!
//! A host typically wants one helper for the whole process. `install` creates
//! it once; later callers reach it through `instance`. `shutdown` must be
//! called before exit, since statics are never dropped and the helper would
//! otherwise outlive the host.

use std::sync::OnceLock;

use crate::config::BridgeConfig;
use crate::service::HelperBridge;

static BRIDGE: OnceLock<HelperBridge> = OnceLock::new();

/// Install the global bridge, or return the existing one.
///
/// The first configuration wins; a later `config` is ignored with a warning.
pub fn install(config: BridgeConfig) -> &'static HelperBridge {
    let mut created = false;
    let bridge = BRIDGE.get_or_init(|| {
        created = true;
        HelperBridge::new(config)
    });
    if !created {
        tracing::warn!("Helper bridge already installed, ignoring new configuration");
    }
    bridge
}

pub fn instance() -> Option<&'static HelperBridge> {
    BRIDGE.get()
}

/// Reap the global helper, if one was installed.
///
/// The instance stays installed; a later call through it starts a new helper.
pub async fn shutdown() {
    if let Some(bridge) = BRIDGE.get() {
        bridge.shutdown().await;
    }
}
