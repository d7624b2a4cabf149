//! Service state management.
//!
//! Contains the facet catalog and the shared registry view.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::CutError;
use crate::registry::SelectorRegistry;
use crate::store::{JsonFileRegistryStore, RegistryStore};
use crate::types::{Facet, FacetAddress};

/// Facet interfaces known to the service, keyed by address.
///
/// Registering the same address again replaces the earlier interface.
#[derive(Debug, Clone, Default)]
pub struct FacetCatalog {
    facets: BTreeMap<FacetAddress, Facet>,
}

impl FacetCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a facet. Returns `true` if it replaced an earlier interface.
    pub fn register(&mut self, facet: Facet) -> bool {
        self.facets.insert(facet.address, facet).is_some()
    }

    /// Interface registered for an address.
    pub fn get(&self, address: &FacetAddress) -> Option<&Facet> {
        self.facets.get(address)
    }

    /// All registered facets, ordered by address.
    pub fn iter(&self) -> impl Iterator<Item = &Facet> {
        self.facets.values()
    }

    /// Number of registered facets.
    pub fn len(&self) -> usize {
        self.facets.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}

/// Registry file another process writes, plus the stamp last loaded.
#[derive(Debug)]
struct RegistrySource {
    store: JsonFileRegistryStore,
    loaded: Mutex<Option<(SystemTime, u64)>>,
}

/// Shared service state.
///
/// The registry mirrors what the applier last persisted. When built with
/// [`ServiceState::from_store`], [`ServiceState::current_registry`] reloads
/// it whenever the file changes. The service plans against it but never
/// submits.
#[derive(Debug, Clone)]
pub struct ServiceState {
    /// Proxy the registry belongs to, if configured.
    pub diamond: Option<FacetAddress>,
    /// Last loaded selector registry.
    pub registry: Arc<RwLock<SelectorRegistry>>,
    /// Registered facet interfaces.
    pub catalog: Arc<RwLock<FacetCatalog>>,
    source: Option<Arc<RegistrySource>>,
}

impl ServiceState {
    /// Create service state around a loaded registry.
    pub fn new(diamond: Option<FacetAddress>, registry: SelectorRegistry) -> Self {
        Self {
            diamond,
            registry: Arc::new(RwLock::new(registry)),
            catalog: Arc::new(RwLock::new(FacetCatalog::new())),
            source: None,
        }
    }

    /// Create service state that follows the registry file behind `store`.
    pub async fn from_store(
        diamond: Option<FacetAddress>,
        store: JsonFileRegistryStore,
    ) -> Result<Self, CutError> {
        let stamp = store.file_stamp().await.map_err(CutError::from_store)?;
        let registry = store.load().await.map_err(CutError::from_store)?;
        info!(
            path = %store.path().display(),
            selectors = registry.len(),
            fingerprint = %registry.fingerprint(),
            "registry loaded"
        );
        Ok(Self {
            source: Some(Arc::new(RegistrySource {
                store,
                loaded: Mutex::new(stamp),
            })),
            ..Self::new(diamond, registry)
        })
    }

    /// Create service state with a pre-populated catalog.
    pub fn with_catalog(
        diamond: Option<FacetAddress>,
        registry: SelectorRegistry,
        catalog: FacetCatalog,
    ) -> Self {
        Self {
            diamond,
            registry: Arc::new(RwLock::new(registry)),
            catalog: Arc::new(RwLock::new(catalog)),
            source: None,
        }
    }

    /// Replace the registry view (after a resync or an applied batch).
    pub fn set_registry(&self, registry: SelectorRegistry) {
        *self.registry.write() = registry;
    }

    /// Registry to plan against, reloaded first if the backing file
    /// changed since the last load. A file that fails to load is logged
    /// and the last good registry is kept.
    pub async fn current_registry(&self) -> SelectorRegistry {
        if let Some(source) = &self.source {
            self.refresh(source).await;
        }
        self.registry.read().clone()
    }

    async fn refresh(&self, source: &RegistrySource) {
        let stamp = match source.store.file_stamp().await {
            Ok(stamp) => stamp,
            Err(e) => {
                warn!(error = %e, "registry file unreadable; serving last loaded registry");
                return;
            }
        };
        let unchanged = *source.loaded.lock() == stamp;
        if unchanged {
            return;
        }

        match source.store.load().await {
            Ok(registry) => {
                info!(
                    path = %source.store.path().display(),
                    selectors = registry.len(),
                    fingerprint = %registry.fingerprint(),
                    "registry file changed; reloaded"
                );
                self.set_registry(registry);
                *source.loaded.lock() = stamp;
            }
            Err(e) => {
                warn!(error = %e, "registry reload failed; serving last loaded registry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_register_replaces() {
        let mut catalog = FacetCatalog::new();
        let address = FacetAddress::repeat_byte(0xaa);

        assert!(!catalog.register(Facet::new(address, ["a()"]).unwrap()));
        assert!(catalog.register(Facet::new(address, ["a()", "b()"]).unwrap()));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&address).unwrap().len(), 2);
    }

    #[test]
    fn test_state_clones_share_registry() {
        let state = ServiceState::new(None, SelectorRegistry::new());
        let clone = state.clone();

        let registry = SelectorRegistry::from_entries([(
            crate::types::selector_of("a()").unwrap(),
            FacetAddress::repeat_byte(0xaa),
        )])
        .unwrap();
        state.set_registry(registry.clone());

        assert_eq!(*clone.registry.read(), registry);
    }

    fn owned(sig: &str, byte: u8) -> SelectorRegistry {
        SelectorRegistry::from_entries([(
            crate::types::selector_of(sig).unwrap(),
            FacetAddress::repeat_byte(byte),
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn test_reloads_after_external_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let writer = JsonFileRegistryStore::new(&path);
        writer.save(&SelectorRegistry::new()).await.unwrap();

        let state = ServiceState::from_store(None, JsonFileRegistryStore::new(&path))
            .await
            .unwrap();
        assert!(state.current_registry().await.is_empty());

        let next = owned("owner()", 0xaa);
        writer.save(&next).await.unwrap();
        assert_eq!(state.current_registry().await, next);
        assert_eq!(*state.registry.read(), next);
    }

    #[tokio::test]
    async fn test_corrupt_file_keeps_last_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let first = owned("owner()", 0xaa);
        JsonFileRegistryStore::new(&path).save(&first).await.unwrap();

        let state = ServiceState::from_store(None, JsonFileRegistryStore::new(&path))
            .await
            .unwrap();
        std::fs::write(&path, b"{ truncated").unwrap();

        assert_eq!(state.current_registry().await, first);
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty_then_follows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let state = ServiceState::from_store(None, JsonFileRegistryStore::new(&path))
            .await
            .unwrap();
        assert!(state.current_registry().await.is_empty());

        let next = owned("owner()", 0xbb);
        JsonFileRegistryStore::new(&path).save(&next).await.unwrap();
        assert_eq!(state.current_registry().await, next);
    }
}
