//! # diamond-cut-kernel
//!
//! Deterministic upgrade planning for multi-facet proxies (diamonds).
//!
//! A diamond routes every call by its 4-byte function selector to one facet.
//! The kernel answers one question:
//!
//! > Given the current routing and a list of upgrade requests, which exact
//! > cuts move the proxy to the requested state, and did they land?
//!
//! ## Core Contract
//!
//! 1. Derive selectors from canonical signatures (Keccak-256, first 4 bytes)
//! 2. Plan a batch of cuts against a fingerprinted registry snapshot
//! 3. Apply the batch atomically through the routing table and mirror it locally
//!
//! ## Architecture
//!
//! ```text
//! UpgradeRequest → CutPlanner → CutBatch → CutApplier → CutReceipt
//!                      ↑                        ↓
//!             FacetInterfaceSource       RoutingTable + RegistryStore
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same registry + same requests + same facets → identical batch_id
//! - Registry iteration is ordered by selector
//! - Registry fingerprint is a canonical hash of the selector → facet map

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod canonical;
pub mod abi;
pub mod interface;
pub mod registry;
pub mod planner;
pub mod routing;
pub mod store;
pub mod applier;
pub mod config;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    selector_of, CutAction, CutBatch, Facet, FacetAddress, FacetCut, FunctionSignature, InitCall,
    Selector, SelectorState, SignatureSelection, UpgradeRequest, ADDRESS_LEN, SELECTOR_LEN,
};
pub use error::CutError;
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use abi::signatures_from_abi;
pub use interface::{
    resolve_signatures, selectors_of, CacheConfig, CacheStats, CachedInterfaceSource,
    FacetInterfaceSource, InMemoryInterfaceSource,
};
pub use registry::{FacetSelectors, FoldFailure, SelectorRegistry};
pub use planner::{CutPlanner, Plan, PlanDiagnostic};
pub use routing::{CommitStatus, InMemoryRoutingError, InMemoryRoutingTable, RoutingTable, Submission};
pub use store::{InMemoryRegistryStore, JsonFileRegistryStore, JsonStoreError, RegistryStore};
pub use applier::{CutApplier, CutReceipt};
pub use config::{ApplierConfig, KernelConfig};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version of the persisted registry document.
/// Increment on breaking changes to its layout.
pub const REGISTRY_SCHEMA_VERSION: &str = "1.0.0";

/// Name of the interface-detection function every diamond should expose.
pub const SUPPORTS_INTERFACE_SIGNATURE: &str = "supportsInterface(bytes4)";
