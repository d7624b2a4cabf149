//! In-memory registry store for testing.

use std::convert::Infallible;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::RegistryStore;
use crate::registry::SelectorRegistry;

/// Registry store that keeps the last saved registry in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistryStore {
    saved: RwLock<SelectorRegistry>,
    saves: RwLock<usize>,
}

impl InMemoryRegistryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `registry`.
    pub fn with_registry(registry: SelectorRegistry) -> Self {
        Self {
            saved: RwLock::new(registry),
            saves: RwLock::new(0),
        }
    }

    /// Last saved registry.
    pub fn saved(&self) -> SelectorRegistry {
        self.saved.read().clone()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.read()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    type Error = Infallible;

    async fn load(&self) -> Result<SelectorRegistry, Self::Error> {
        Ok(self.saved())
    }

    async fn save(&self, registry: &SelectorRegistry) -> Result<(), Self::Error> {
        *self.saved.write() = registry.clone();
        *self.saves.write() += 1;
        Ok(())
    }
}
