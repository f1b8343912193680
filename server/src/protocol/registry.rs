//! Startup adapter selection and capability negotiation
//!
//! The wire generation is fixed for the lifetime of the process: the
//! registry resolves the configured version string to a fully-constructed
//! adapter, and the capability check runs once here so a mismatched
//! rendering mode can never surface at runtime.

use crate::ident::IdRange;
use crate::server::ConnectionRegistry;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::v1::AdapterV1;
use super::v2::AdapterV2;
use super::v3::AdapterV3;
use super::{Capability, ClickCallback, ProtocolAdapter};

/// Version strings the registry can resolve, newest first
pub const SUPPORTED_VERSIONS: &[&str] = &[AdapterV3::VERSION, AdapterV2::VERSION, AdapterV1::VERSION];

/// Construction-time configuration shared by every adapter generation
#[derive(Debug, Clone, Copy)]
pub struct AdapterConfig {
    /// Entity handle ring; must be disjoint from `canvas_ids`
    pub entity_ids: IdRange,
    /// Canvas handle ring
    pub canvas_ids: IdRange,
    /// Force the frame hitbox to the block top regardless of orientation
    pub force_hitbox_top: bool,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown protocol version '{0}'")]
    UnknownVersion(String),

    #[error("protocol {version} lacks required capability {capability:?}")]
    MissingCapability {
        version: &'static str,
        capability: Capability,
    },
}

/// Resolve a version string to its adapter.
pub fn select_adapter(
    version: &str,
    connections: Arc<ConnectionRegistry>,
    config: AdapterConfig,
    on_click: ClickCallback,
) -> Result<Arc<dyn ProtocolAdapter>, RegistryError> {
    let adapter: Arc<dyn ProtocolAdapter> = match version {
        AdapterV1::VERSION => Arc::new(AdapterV1::new(connections, &config, on_click)),
        AdapterV2::VERSION => Arc::new(AdapterV2::new(connections, &config, on_click)),
        AdapterV3::VERSION => Arc::new(AdapterV3::new(connections, &config, on_click)),
        other => return Err(RegistryError::UnknownVersion(other.to_string())),
    };
    info!(version = adapter.version(), "selected protocol adapter");
    Ok(adapter)
}

/// Fail fast when the selected generation cannot express a capability the
/// configured rendering mode needs.
pub fn ensure_capability(
    adapter: &dyn ProtocolAdapter,
    capability: Capability,
) -> Result<(), RegistryError> {
    if adapter.capabilities().contains(capability) {
        Ok(())
    } else {
        Err(RegistryError::MissingCapability {
            version: adapter.version(),
            capability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdapterConfig {
        AdapterConfig {
            entity_ids: IdRange::new(100_000, 199_999),
            canvas_ids: IdRange::new(20_000, 29_999),
            force_hitbox_top: false,
        }
    }

    fn noop_click() -> ClickCallback {
        Arc::new(|_, _| {})
    }

    #[test]
    fn test_selects_every_supported_version() {
        for version in SUPPORTED_VERSIONS {
            let adapter = select_adapter(
                version,
                Arc::new(ConnectionRegistry::new()),
                config(),
                noop_click(),
            )
            .unwrap();
            assert_eq!(adapter.version(), *version);
            assert!(adapter.capabilities().contains(Capability::RasterCanvas));
        }
    }

    #[test]
    fn test_unknown_version_is_an_error() {
        let result = select_adapter(
            "v99",
            Arc::new(ConnectionRegistry::new()),
            config(),
            noop_click(),
        );
        assert!(matches!(result, Err(RegistryError::UnknownVersion(_))));
    }

    #[test]
    fn test_capability_gate() {
        let registry = Arc::new(ConnectionRegistry::new());
        let v1 = select_adapter("v1", registry.clone(), config(), noop_click()).unwrap();
        let v3 = select_adapter("v3", registry, config(), noop_click()).unwrap();

        assert!(ensure_capability(v1.as_ref(), Capability::RasterCanvas).is_ok());
        assert!(matches!(
            ensure_capability(v1.as_ref(), Capability::GridEntityDisplay),
            Err(RegistryError::MissingCapability { .. })
        ));
        assert!(ensure_capability(v3.as_ref(), Capability::GridEntityDisplay).is_ok());
    }
}
