//! Core types for the cut kernel.

pub mod address;
pub mod selector;
pub mod facet;
pub mod cut;

pub use address::{FacetAddress, ADDRESS_LEN};
pub use selector::{selector_of, FunctionSignature, Selector, SELECTOR_LEN};
pub use facet::{Facet, SignatureSelection, UpgradeRequest};
pub use cut::{CutAction, CutBatch, FacetCut, InitCall, SelectorState};
