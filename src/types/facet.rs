//! Facets and upgrade requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::address::FacetAddress;
use super::cut::CutAction;
use super::selector::{FunctionSignature, Selector};
use crate::error::CutError;

/// A deployed facet: an address plus the signatures it exposes.
///
/// Signatures keep declaration order and are deduplicated on construction.
/// Two distinct signatures hashing to the same selector are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFacet")]
pub struct Facet {
    /// Deployed address.
    pub address: FacetAddress,
    signatures: Vec<FunctionSignature>,
}

#[derive(Deserialize)]
struct RawFacet {
    address: FacetAddress,
    signatures: Vec<String>,
}

impl TryFrom<RawFacet> for Facet {
    type Error = CutError;

    fn try_from(raw: RawFacet) -> Result<Self, Self::Error> {
        Facet::new(raw.address, raw.signatures)
    }
}

impl Facet {
    /// Build a facet from signature strings.
    pub fn new<I, S>(address: FacetAddress, signatures: I) -> Result<Self, CutError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = signatures
            .into_iter()
            .map(|s| FunctionSignature::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_signatures(address, parsed)
    }

    /// Build a facet from already-parsed signatures.
    pub fn from_signatures(
        address: FacetAddress,
        signatures: Vec<FunctionSignature>,
    ) -> Result<Self, CutError> {
        let mut seen: BTreeMap<Selector, FunctionSignature> = BTreeMap::new();
        let mut ordered = Vec::with_capacity(signatures.len());

        for signature in signatures {
            match seen.get(&signature.selector()) {
                Some(existing) if existing == &signature => continue,
                Some(existing) => {
                    return Err(CutError::SelectorCollision {
                        selector: signature.selector(),
                        first: existing.to_string(),
                        second: signature.to_string(),
                    })
                }
                None => {
                    seen.insert(signature.selector(), signature.clone());
                    ordered.push(signature);
                }
            }
        }

        Ok(Self {
            address,
            signatures: ordered,
        })
    }

    /// Build a facet from a Solidity JSON ABI (or a build artifact holding one).
    pub fn from_abi(address: FacetAddress, abi: &serde_json::Value) -> Result<Self, CutError> {
        Self::from_signatures(address, crate::abi::signatures_from_abi(abi)?)
    }

    /// Exposed signatures in declaration order.
    pub fn signatures(&self) -> &[FunctionSignature] {
        &self.signatures
    }

    /// Find an exposed signature by its text.
    pub fn signature(&self, text: &str) -> Option<&FunctionSignature> {
        self.signatures.iter().find(|s| s.as_str() == text)
    }

    /// Whether the facet exposes the given selector.
    pub fn exposes(&self, selector: &Selector) -> bool {
        self.signatures.iter().any(|s| s.selector() == *selector)
    }

    /// Number of exposed functions.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the facet exposes nothing.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Which of a facet's signatures an upgrade request covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "signatures", rename_all = "snake_case")]
pub enum SignatureSelection {
    /// Every exposed signature, in declaration order.
    #[default]
    All,
    /// Only these signatures, in the given order.
    Only(Vec<String>),
    /// Every exposed signature except these.
    AllExcept(Vec<String>),
}

/// One upgrade instruction: a facet, an action and a signature selection.
///
/// For `Remove`, `facet` names the facet that must currently own the
/// selectors; the emitted cut targets the null address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    /// Facet whose interface resolves the signatures.
    pub facet: FacetAddress,
    /// Declared action.
    pub action: CutAction,
    /// Signatures covered.
    #[serde(default)]
    pub selection: SignatureSelection,
}

impl UpgradeRequest {
    /// Request covering every signature of `facet`.
    pub fn new(facet: FacetAddress, action: CutAction) -> Self {
        Self {
            facet,
            action,
            selection: SignatureSelection::All,
        }
    }

    /// `Add` request.
    pub fn add(facet: FacetAddress) -> Self {
        Self::new(facet, CutAction::Add)
    }

    /// `Replace` request.
    pub fn replace(facet: FacetAddress) -> Self {
        Self::new(facet, CutAction::Replace)
    }

    /// `Remove` request.
    pub fn remove(facet: FacetAddress) -> Self {
        Self::new(facet, CutAction::Remove)
    }

    /// Restrict to the given signatures.
    pub fn only<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = SignatureSelection::Only(signatures.into_iter().map(Into::into).collect());
        self
    }

    /// Cover everything except the given signatures.
    pub fn except<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection =
            SignatureSelection::AllExcept(signatures.into_iter().map(Into::into).collect());
        self
    }

    /// Address the emitted cut targets.
    pub fn cut_target(&self) -> FacetAddress {
        match self.action {
            CutAction::Remove => FacetAddress::ZERO,
            _ => self.facet,
        }
    }
}
