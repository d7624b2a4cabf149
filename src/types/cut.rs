//! Cut records and batches.
//!
//! A `FacetCut` is one (facet, action, selectors) unit. A `CutBatch` is the
//! ordered group of cuts plus at most one initialization call that the
//! routing table applies all-or-nothing.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::address::FacetAddress;
use super::selector::{FunctionSignature, Selector};
use crate::canonical::canonical_hash_hex;
use crate::error::CutError;

/// Cut action, numbered as the routing table's `FacetCutAction` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutAction {
    /// Route currently unowned selectors to a facet.
    Add,
    /// Move selectors owned by another facet to this facet.
    Replace,
    /// Stop routing selectors. The cut targets the null address.
    Remove,
}

impl CutAction {
    /// Numeric code used on the wire (`0`, `1`, `2`).
    pub fn code(&self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Replace => 1,
            Self::Remove => 2,
        }
    }
}

impl fmt::Display for CutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "Add"),
            Self::Replace => write!(f, "Replace"),
            Self::Remove => write!(f, "Remove"),
        }
    }
}

/// Observed ownership state of a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "facet", rename_all = "snake_case")]
pub enum SelectorState {
    /// No facet routes this selector.
    Unowned,
    /// Routed to the given facet.
    OwnedBy(FacetAddress),
}

impl fmt::Display for SelectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unowned => write!(f, "unowned"),
            Self::OwnedBy(facet) => write!(f, "owned by {facet}"),
        }
    }
}

/// One atomic unit of change for a facet/action pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCut {
    /// Target facet (null for `Remove`).
    pub facet_address: FacetAddress,
    /// What to do with the selectors.
    pub action: CutAction,
    /// Selectors in resolution order.
    pub selectors: Vec<Selector>,
}

impl FacetCut {
    /// Create a cut.
    pub fn new(facet_address: FacetAddress, action: CutAction, selectors: Vec<Selector>) -> Self {
        Self {
            facet_address,
            action,
            selectors,
        }
    }

    /// Create a `Remove` cut (targets the null address).
    pub fn remove(selectors: Vec<Selector>) -> Self {
        Self::new(FacetAddress::ZERO, CutAction::Remove, selectors)
    }

    /// Whether the cut lists no selectors.
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Whether the cut lists the given selector.
    pub fn touches(&self, selector: &Selector) -> bool {
        self.selectors.contains(selector)
    }
}

/// One-time initialization call executed after all cuts of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInitCall")]
pub struct InitCall {
    /// Contract the routing table delegate-calls.
    pub target: FacetAddress,
    /// Opaque calldata.
    #[serde(with = "hex_bytes")]
    pub calldata: Vec<u8>,
}

#[derive(Deserialize)]
struct RawInitCall {
    target: FacetAddress,
    #[serde(with = "hex_bytes")]
    calldata: Vec<u8>,
}

impl TryFrom<RawInitCall> for InitCall {
    type Error = CutError;

    fn try_from(raw: RawInitCall) -> Result<Self, Self::Error> {
        InitCall::new(raw.target, raw.calldata)
    }
}

impl InitCall {
    /// Create an init call.
    ///
    /// The null target and empty calldata are both rejected: "no init" is
    /// expressed as the absence of an `InitCall`.
    pub fn new(target: FacetAddress, calldata: Vec<u8>) -> Result<Self, CutError> {
        if target.is_zero() {
            return Err(CutError::InvalidInitCall(
                "init target is the null address".to_string(),
            ));
        }
        if calldata.is_empty() {
            return Err(CutError::InvalidInitCall(format!(
                "init call to {target} has empty calldata"
            )));
        }
        Ok(Self { target, calldata })
    }

    /// Init call for a zero-argument function (calldata is the bare selector).
    pub fn from_signature(target: FacetAddress, signature: &str) -> Result<Self, CutError> {
        let signature = FunctionSignature::parse(signature)?;
        if !signature.as_str().ends_with("()") {
            return Err(CutError::InvalidInitCall(format!(
                "{signature} takes arguments; encode its calldata explicitly"
            )));
        }
        Self::new(target, signature.selector().as_bytes().to_vec())
    }
}

/// Ordered cuts plus an optional init call, applied as one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutBatch {
    /// Cuts in application order.
    pub cuts: Vec<FacetCut>,
    /// Optional initialization call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<InitCall>,
    /// Fingerprint of the registry the batch was planned against.
    pub base_fingerprint: String,
}

impl CutBatch {
    /// Empty batch planned against the given registry fingerprint.
    pub fn new(base_fingerprint: impl Into<String>) -> Self {
        Self {
            cuts: Vec::new(),
            init: None,
            base_fingerprint: base_fingerprint.into(),
        }
    }

    /// Append a cut.
    pub fn with_cut(mut self, cut: FacetCut) -> Self {
        self.cuts.push(cut);
        self
    }

    /// Attach an init call.
    pub fn with_init(mut self, init: InitCall) -> Self {
        self.init = Some(init);
        self
    }

    /// Whether submitting the batch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.init.is_none() && self.cuts.iter().all(FacetCut::is_empty)
    }

    /// Total number of selectors across all cuts.
    pub fn selector_count(&self) -> usize {
        self.cuts.iter().map(|c| c.selectors.len()).sum()
    }

    /// Deterministic identifier over cuts, init call and base fingerprint.
    pub fn batch_id(&self) -> String {
        canonical_hash_hex(self)
    }
}

/// `0x`-prefixed hex encoding for opaque byte payloads.
mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}
