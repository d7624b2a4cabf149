//! In-memory facet interface source.

use std::collections::BTreeMap;
use std::convert::Infallible;

use async_trait::async_trait;

use super::FacetInterfaceSource;
use crate::types::{Facet, FacetAddress};

/// Facet interfaces held in memory, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInterfaceSource {
    facets: BTreeMap<FacetAddress, Facet>,
}

impl InMemoryInterfaceSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a facet interface.
    pub fn insert(&mut self, facet: Facet) {
        self.facets.insert(facet.address, facet);
    }

    /// Builder-style `insert`.
    pub fn with_facet(mut self, facet: Facet) -> Self {
        self.insert(facet);
        self
    }

    /// Number of known facets.
    pub fn len(&self) -> usize {
        self.facets.len()
    }

    /// Whether no facets are known.
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}

#[async_trait]
impl FacetInterfaceSource for InMemoryInterfaceSource {
    type Error = Infallible;

    async fn facet(&self, address: &FacetAddress) -> Result<Option<Facet>, Self::Error> {
        Ok(self.facets.get(address).cloned())
    }
}
