//! Registry persistence backends.
//!
//! The registry is loaded once at start-up and saved after every successful
//! application. The persisted form is the plain selector → facet mapping.

pub mod memory;
pub mod json_file;

use async_trait::async_trait;

use crate::registry::SelectorRegistry;

/// Trait for registry persistence backends.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Load the persisted registry (empty if nothing was saved yet).
    async fn load(&self) -> Result<SelectorRegistry, Self::Error>;

    /// Persist the registry, replacing what was stored.
    async fn save(&self, registry: &SelectorRegistry) -> Result<(), Self::Error>;
}

pub use memory::InMemoryRegistryStore;
pub use json_file::{JsonFileRegistryStore, JsonStoreError};
