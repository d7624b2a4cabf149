//! Selector registry: the local view of which facet routes which selector.
//!
//! ## Invariants
//!
//! - Every stored selector maps to exactly one facet
//! - The null address is never stored as an owner (removal deletes the entry)
//! - `apply` is all-or-nothing per cut: on error the registry is unchanged
//!
//! Backed by a `BTreeMap`, so iteration, serialization and the fingerprint
//! are canonical.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::error::CutError;
use crate::types::{CutAction, FacetAddress, FacetCut, Selector, SelectorState};

/// Mapping of selector to owning facet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Selector, FacetAddress>",
    into = "BTreeMap<Selector, FacetAddress>"
)]
pub struct SelectorRegistry {
    routes: BTreeMap<Selector, FacetAddress>,
}

/// Loupe view: one facet and the selectors it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetSelectors {
    /// Facet address.
    pub facet_address: FacetAddress,
    /// Owned selectors, ascending.
    pub selectors: Vec<Selector>,
}

/// A batch that could not be folded onto a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldFailure {
    /// Index of the first cut that failed.
    pub cut_index: usize,
    /// Why it failed.
    pub error: CutError,
}

impl SelectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from (selector, owner) pairs.
    ///
    /// Rejects null owners and selectors listed twice with different owners.
    pub fn from_entries<I>(entries: I) -> Result<Self, CutError>
    where
        I: IntoIterator<Item = (Selector, FacetAddress)>,
    {
        let mut routes = BTreeMap::new();
        for (selector, owner) in entries {
            if owner.is_zero() {
                return Err(CutError::InvalidAddress(format!(
                    "selector {selector} mapped to the null address"
                )));
            }
            match routes.insert(selector, owner) {
                Some(previous) if previous != owner => {
                    return Err(CutError::SelectorAlreadyOwned {
                        selector,
                        owner: previous,
                    })
                }
                _ => {}
            }
        }
        Ok(Self { routes })
    }

    /// Owning facet of a selector, if any.
    pub fn owner(&self, selector: &Selector) -> Option<FacetAddress> {
        self.routes.get(selector).copied()
    }

    /// Ownership state of a selector.
    pub fn state(&self, selector: &Selector) -> SelectorState {
        match self.owner(selector) {
            Some(facet) => SelectorState::OwnedBy(facet),
            None => SelectorState::Unowned,
        }
    }

    /// Apply one cut in place.
    ///
    /// Every selector is checked against its action's precondition before
    /// anything is written. Selectors listed twice in one cut are checked
    /// as if applied in sequence, so a repeated `Add` fails.
    pub fn apply(&mut self, cut: &FacetCut) -> Result<(), CutError> {
        self.check(cut)?;

        for selector in &cut.selectors {
            match cut.action {
                CutAction::Add | CutAction::Replace => {
                    self.routes.insert(*selector, cut.facet_address);
                }
                CutAction::Remove => {
                    self.routes.remove(selector);
                }
            }
        }
        Ok(())
    }

    /// Pure form of [`apply`](Self::apply): the updated registry, or an error.
    pub fn with_cut(&self, cut: &FacetCut) -> Result<Self, CutError> {
        let mut next = self.clone();
        next.apply(cut)?;
        Ok(next)
    }

    /// Fold a sequence of cuts, in order, onto a copy of this registry.
    pub fn folded(&self, cuts: &[FacetCut]) -> Result<Self, FoldFailure> {
        let mut next = self.clone();
        for (cut_index, cut) in cuts.iter().enumerate() {
            next.apply(cut)
                .map_err(|error| FoldFailure { cut_index, error })?;
        }
        Ok(next)
    }

    fn check(&self, cut: &FacetCut) -> Result<(), CutError> {
        match cut.action {
            CutAction::Add | CutAction::Replace if cut.facet_address.is_zero() => {
                return Err(CutError::NullFacetAddress(cut.action));
            }
            CutAction::Remove if !cut.facet_address.is_zero() => {
                return Err(CutError::InvalidRemoveTarget(cut.facet_address));
            }
            _ => {}
        }

        let mut touched: BTreeSet<Selector> = BTreeSet::new();
        for selector in &cut.selectors {
            // State as seen after the earlier selectors of this same cut.
            let state = if touched.contains(selector) {
                match cut.action {
                    CutAction::Remove => SelectorState::Unowned,
                    _ => SelectorState::OwnedBy(cut.facet_address),
                }
            } else {
                self.state(selector)
            };

            match (cut.action, state) {
                (CutAction::Add, SelectorState::OwnedBy(owner)) => {
                    return Err(CutError::SelectorAlreadyOwned {
                        selector: *selector,
                        owner,
                    });
                }
                (CutAction::Replace, SelectorState::Unowned) => {
                    return Err(CutError::SelectorNotReplaceable {
                        selector: *selector,
                        state,
                    });
                }
                (CutAction::Replace, SelectorState::OwnedBy(owner)) if owner == cut.facet_address => {
                    return Err(CutError::SelectorNotReplaceable {
                        selector: *selector,
                        state,
                    });
                }
                (CutAction::Remove, SelectorState::Unowned) => {
                    return Err(CutError::SelectorNotOwned(*selector));
                }
                _ => {}
            }
            touched.insert(*selector);
        }
        Ok(())
    }

    /// Deterministic fingerprint of the full mapping.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&self.routes)
    }

    /// Number of routed selectors.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing is routed.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate (selector, owner) pairs in selector order.
    pub fn iter(&self) -> impl Iterator<Item = (&Selector, &FacetAddress)> {
        self.routes.iter()
    }

    /// Distinct owning facets, in order of their lowest selector.
    pub fn facet_addresses(&self) -> Vec<FacetAddress> {
        let mut seen = BTreeSet::new();
        self.routes
            .values()
            .filter(|facet| seen.insert(**facet))
            .copied()
            .collect()
    }

    /// Selectors owned by a facet, ascending.
    pub fn facet_function_selectors(&self, facet: &FacetAddress) -> Vec<Selector> {
        self.routes
            .iter()
            .filter(|(_, owner)| *owner == facet)
            .map(|(selector, _)| *selector)
            .collect()
    }

    /// Every facet with its selectors.
    pub fn facets(&self) -> Vec<FacetSelectors> {
        let mut grouped: Vec<FacetSelectors> = Vec::new();
        let mut index: BTreeMap<FacetAddress, usize> = BTreeMap::new();

        for (selector, owner) in &self.routes {
            let slot = *index.entry(*owner).or_insert_with(|| {
                grouped.push(FacetSelectors {
                    facet_address: *owner,
                    selectors: Vec::new(),
                });
                grouped.len() - 1
            });
            grouped[slot].selectors.push(*selector);
        }
        grouped
    }
}

impl TryFrom<BTreeMap<Selector, FacetAddress>> for SelectorRegistry {
    type Error = CutError;

    fn try_from(routes: BTreeMap<Selector, FacetAddress>) -> Result<Self, Self::Error> {
        Self::from_entries(routes)
    }
}

impl From<SelectorRegistry> for BTreeMap<Selector, FacetAddress> {
    fn from(registry: SelectorRegistry) -> Self {
        registry.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::selector_of;

    fn sel(s: &str) -> Selector {
        selector_of(s).unwrap()
    }

    fn facet(byte: u8) -> FacetAddress {
        FacetAddress::repeat_byte(byte)
    }

    fn registry_with(entries: &[(&str, u8)]) -> SelectorRegistry {
        SelectorRegistry::from_entries(entries.iter().map(|(s, f)| (sel(s), facet(*f)))).unwrap()
    }

    #[test]
    fn test_owner_lookup_never_fails() {
        let registry = registry_with(&[("getOwner()", 0xbb)]);
        assert_eq!(registry.owner(&sel("getOwner()")), Some(facet(0xbb)));
        assert_eq!(registry.owner(&sel("setListingFee(uint256)")), None);
        assert_eq!(registry.state(&sel("setListingFee(uint256)")), SelectorState::Unowned);
    }

    #[test]
    fn test_add_assigns_ownership() {
        let mut registry = SelectorRegistry::new();
        let cut = FacetCut::new(
            facet(0xaa),
            CutAction::Add,
            vec![sel("setListingFee(uint256)"), sel("setEthPriceFeed(address)")],
        );
        registry.apply(&cut).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.owner(&sel("setEthPriceFeed(address)")), Some(facet(0xaa)));
    }

    #[test]
    fn test_add_of_owned_selector_is_all_or_nothing() {
        let mut registry = registry_with(&[("getOwner()", 0xbb)]);
        let before = registry.clone();

        let cut = FacetCut::new(
            facet(0xcc),
            CutAction::Add,
            vec![sel("setListingFee(uint256)"), sel("getOwner()")],
        );
        let err = registry.apply(&cut).unwrap_err();

        assert_eq!(
            err,
            CutError::SelectorAlreadyOwned {
                selector: sel("getOwner()"),
                owner: facet(0xbb),
            }
        );
        assert_eq!(registry, before);
    }

    #[test]
    fn test_duplicate_selector_in_one_add_fails() {
        let mut registry = SelectorRegistry::new();
        let cut = FacetCut::new(facet(0xaa), CutAction::Add, vec![sel("a()"), sel("a()")]);
        assert!(matches!(
            registry.apply(&cut),
            Err(CutError::SelectorAlreadyOwned { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_rules() {
        let mut registry = registry_with(&[("getOwner()", 0xbb)]);

        // Unowned selectors cannot be replaced.
        let unowned = FacetCut::new(facet(0xcc), CutAction::Replace, vec![sel("x()")]);
        assert!(matches!(
            registry.apply(&unowned),
            Err(CutError::SelectorNotReplaceable { .. })
        ));

        // Replacing with the current owner is rejected too.
        let same = FacetCut::new(facet(0xbb), CutAction::Replace, vec![sel("getOwner()")]);
        assert!(matches!(
            registry.apply(&same),
            Err(CutError::SelectorNotReplaceable { .. })
        ));

        let moved = FacetCut::new(facet(0xcc), CutAction::Replace, vec![sel("getOwner()")]);
        registry.apply(&moved).unwrap();
        assert_eq!(registry.owner(&sel("getOwner()")), Some(facet(0xcc)));
    }

    #[test]
    fn test_remove_rules() {
        let mut registry = registry_with(&[("getOwner()", 0xbb), ("a()", 0xbb)]);
        let before = registry.clone();

        let wrong_target = FacetCut::new(facet(0xbb), CutAction::Remove, vec![sel("getOwner()")]);
        assert_eq!(
            registry.apply(&wrong_target),
            Err(CutError::InvalidRemoveTarget(facet(0xbb)))
        );

        let partly_unowned = FacetCut::remove(vec![sel("a()"), sel("b()")]);
        assert_eq!(
            registry.apply(&partly_unowned),
            Err(CutError::SelectorNotOwned(sel("b()")))
        );
        assert_eq!(registry, before);

        registry.apply(&FacetCut::remove(vec![sel("a()")])).unwrap();
        assert_eq!(registry.owner(&sel("a()")), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_null_target_for_add() {
        let mut registry = SelectorRegistry::new();
        let cut = FacetCut::new(FacetAddress::ZERO, CutAction::Add, vec![sel("a()")]);
        assert_eq!(
            registry.apply(&cut),
            Err(CutError::NullFacetAddress(CutAction::Add))
        );
    }

    #[test]
    fn test_from_entries_rejects_null_and_conflicts() {
        assert!(SelectorRegistry::from_entries([(sel("a()"), FacetAddress::ZERO)]).is_err());
        assert!(SelectorRegistry::from_entries([
            (sel("a()"), facet(1)),
            (sel("a()"), facet(2)),
        ])
        .is_err());
        assert!(SelectorRegistry::from_entries([
            (sel("a()"), facet(1)),
            (sel("a()"), facet(1)),
        ])
        .is_ok());
    }

    #[test]
    fn test_folded_reports_failing_cut() {
        let registry = SelectorRegistry::new();
        let cuts = vec![
            FacetCut::new(facet(0xaa), CutAction::Add, vec![sel("a()")]),
            FacetCut::new(facet(0xbb), CutAction::Add, vec![sel("a()")]),
        ];
        let failure = registry.folded(&cuts).unwrap_err();
        assert_eq!(failure.cut_index, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = registry_with(&[("a()", 1), ("b()", 2)]);
        let b = registry_with(&[("b()", 2), ("a()", 1)]);
        let c = registry_with(&[("a()", 1), ("b()", 3)]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), SelectorRegistry::new().fingerprint());
    }

    #[test]
    fn test_loupe_views() {
        let registry = registry_with(&[("a()", 1), ("b()", 2), ("c()", 1)]);

        let addresses = registry.facet_addresses();
        assert_eq!(addresses.len(), 2);

        let owned_by_1 = registry.facet_function_selectors(&facet(1));
        assert_eq!(owned_by_1.len(), 2);
        assert!(owned_by_1.contains(&sel("a()")));
        assert!(owned_by_1.contains(&sel("c()")));

        let facets = registry.facets();
        assert_eq!(facets.len(), 2);
        assert_eq!(facets.iter().map(|f| f.selectors.len()).sum::<usize>(), 3);
    }

    #[test]
    fn test_serde_round_trip_and_validation() {
        let registry = registry_with(&[("getOwner()", 0xbb)]);
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json[sel("getOwner()").to_hex()], facet(0xbb).to_hex());

        let back: SelectorRegistry = serde_json::from_value(json).unwrap();
        assert_eq!(back, registry);

        let null_owner = serde_json::json!({ "0x8da5cb5b": FacetAddress::ZERO });
        assert!(serde_json::from_value::<SelectorRegistry>(null_owner).is_err());
    }
}
