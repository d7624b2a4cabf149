//! Facet interface reading.
//!
//! Resolves an upgrade request's signature selection against a facet's
//! exposed interface. Every requested signature must exist on the facet:
//! a hand-maintained signature string that drifted from the deployed code
//! fails with `UnknownSignature` instead of silently resolving to nothing.
//!
//! ## Ordering
//!
//! - `All` and `AllExcept`: declaration order of the facet
//! - `Only`: caller-requested order, duplicates dropped

pub mod cached;
pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::CutError;
use crate::types::{Facet, FacetAddress, FunctionSignature, Selector, SignatureSelection};

/// Source of facet interfaces (ABI inspection, static metadata, ...).
#[async_trait]
pub trait FacetInterfaceSource: Send + Sync {
    /// Error type for lookups.
    type Error: std::error::Error + Send + Sync;

    /// Fetch the interface exposed at `address`, if known.
    async fn facet(&self, address: &FacetAddress) -> Result<Option<Facet>, Self::Error>;
}

pub use cached::{CacheConfig, CacheStats, CachedInterfaceSource};
pub use memory::InMemoryInterfaceSource;

/// Resolve a selection to the facet's signatures.
pub fn resolve_signatures(
    facet: &Facet,
    selection: &SignatureSelection,
) -> Result<Vec<FunctionSignature>, CutError> {
    match selection {
        SignatureSelection::All => Ok(facet.signatures().to_vec()),
        SignatureSelection::Only(requested) => {
            let mut seen = BTreeSet::new();
            let mut resolved = Vec::with_capacity(requested.len());
            for text in requested {
                let signature = lookup(facet, text)?;
                if seen.insert(signature.selector()) {
                    resolved.push(signature.clone());
                }
            }
            Ok(resolved)
        }
        SignatureSelection::AllExcept(excluded) => {
            let excluded = excluded
                .iter()
                .map(|text| lookup(facet, text).map(FunctionSignature::selector))
                .collect::<Result<BTreeSet<_>, _>>()?;
            Ok(facet
                .signatures()
                .iter()
                .filter(|s| !excluded.contains(&s.selector()))
                .cloned()
                .collect())
        }
    }
}

/// Selectors of a facet, optionally restricted by a selection.
pub fn selectors_of(facet: &Facet, selection: &SignatureSelection) -> Result<Vec<Selector>, CutError> {
    Ok(resolve_signatures(facet, selection)?
        .iter()
        .map(FunctionSignature::selector)
        .collect())
}

fn lookup<'a>(facet: &'a Facet, text: &str) -> Result<&'a FunctionSignature, CutError> {
    // Validate format first so typos in the grammar report as such.
    FunctionSignature::parse(text)?;
    facet.signature(text).ok_or_else(|| CutError::UnknownSignature {
        facet: facet.address,
        signature: text.to_string(),
    })
}
