//! Property tests for registry and planner invariants.

use std::collections::BTreeMap;

use proptest::prelude::*;

use diamond_cut_kernel::{
    selector_of, CutAction, CutError, CutPlanner, Facet, FacetAddress, FacetCut, Selector,
    SelectorRegistry, UpgradeRequest,
};

const SIGNATURES: [&str; 10] = [
    "getOwner()",
    "setListingFee(uint256)",
    "setEthPriceFeed(address)",
    "transfer(address,uint256)",
    "balanceOf(address)",
    "approve(address,uint256)",
    "supportsInterface(bytes4)",
    "facets()",
    "pause()",
    "listItem((address,uint256)[],bytes32)",
];

fn selector_pool() -> Vec<Selector> {
    SIGNATURES.iter().map(|s| selector_of(s).unwrap()).collect()
}

fn owner() -> impl Strategy<Value = FacetAddress> {
    (1u8..=4).prop_map(FacetAddress::repeat_byte)
}

/// Registry over the signature pool: each selector unowned or owned by one
/// of four facets.
fn registry() -> impl Strategy<Value = SelectorRegistry> {
    prop::collection::vec(prop::option::of(owner()), SIGNATURES.len()).prop_map(|owners| {
        let entries: BTreeMap<Selector, FacetAddress> = selector_pool()
            .into_iter()
            .zip(owners)
            .filter_map(|(sel, owner)| owner.map(|o| (sel, o)))
            .collect();
        SelectorRegistry::from_entries(entries).unwrap()
    })
}

fn selectors() -> impl Strategy<Value = Vec<Selector>> {
    prop::sample::subsequence(selector_pool(), 1..=SIGNATURES.len())
}

proptest! {
    #[test]
    fn add_is_all_or_nothing(r in registry(), facet in owner(), sels in selectors()) {
        let cut = FacetCut::new(facet, CutAction::Add, sels.clone());
        let any_owned = sels.iter().any(|s| r.owner(s).is_some());

        let mut applied = r.clone();
        let result = applied.apply(&cut);

        if any_owned {
            let is_already_owned = matches!(result, Err(CutError::SelectorAlreadyOwned { .. }));
            prop_assert!(is_already_owned);
            prop_assert_eq!(&applied, &r);
        } else {
            prop_assert!(result.is_ok());
            for s in &sels {
                prop_assert_eq!(applied.owner(s), Some(facet));
            }
            prop_assert_eq!(applied.len(), r.len() + sels.len());
        }
    }

    #[test]
    fn remove_is_all_or_nothing(r in registry(), sels in selectors()) {
        let cut = FacetCut::remove(sels.clone());
        let any_unowned = sels.iter().any(|s| r.owner(s).is_none());

        let mut applied = r.clone();
        let result = applied.apply(&cut);

        if any_unowned {
            prop_assert!(result.is_err());
            prop_assert_eq!(&applied, &r);
        } else {
            prop_assert!(result.is_ok());
            for s in &sels {
                prop_assert_eq!(applied.owner(s), None);
            }
        }
    }

    #[test]
    fn remove_naming_other_owner_is_rejected(r in registry(), facet in owner(), mask in prop::collection::vec(any::<bool>(), SIGNATURES.len())) {
        let chosen: Vec<&str> = SIGNATURES
            .iter()
            .zip(&mask)
            .filter_map(|(sig, keep)| keep.then_some(*sig))
            .collect();
        prop_assume!(!chosen.is_empty());

        let planner = CutPlanner::new().with_facet(Facet::new(facet, chosen.clone()).unwrap());
        let all_owned_by_facet = chosen
            .iter()
            .all(|sig| r.owner(&selector_of(sig).unwrap()) == Some(facet));

        match planner.plan(&r, &[UpgradeRequest::remove(facet)]) {
            Ok(plan) => {
                prop_assert!(all_owned_by_facet);
                let next = r.folded(&plan.batch.cuts).unwrap();
                for sig in &chosen {
                    prop_assert_eq!(next.owner(&selector_of(sig).unwrap()), None);
                }
            }
            Err(e) => {
                prop_assert!(!all_owned_by_facet);
                let is_mismatch = matches!(e, CutError::ActionMismatch { declared: CutAction::Remove, .. });
                prop_assert!(is_mismatch);
            }
        }
    }

    #[test]
    fn add_then_remove_restores_registry(r in registry(), mask in prop::collection::vec(any::<bool>(), SIGNATURES.len())) {
        // A facet outside the generated owner range, exposing only selectors
        // that are unowned in `r`.
        let facet = FacetAddress::repeat_byte(0xee);
        let chosen: Vec<&str> = SIGNATURES
            .iter()
            .zip(&mask)
            .filter(|(sig, keep)| **keep && r.owner(&selector_of(sig).unwrap()).is_none())
            .map(|(sig, _)| *sig)
            .collect();
        prop_assume!(!chosen.is_empty());

        let planner = CutPlanner::new().with_facet(Facet::new(facet, chosen).unwrap());

        let add = planner.plan(&r, &[UpgradeRequest::add(facet)]).unwrap();
        let added = r.folded(&add.batch.cuts).unwrap();
        let remove = planner.plan(&added, &[UpgradeRequest::remove(facet)]).unwrap();
        let restored = added.folded(&remove.batch.cuts).unwrap();

        prop_assert_eq!(&restored, &r);
        prop_assert_eq!(restored.fingerprint(), r.fingerprint());
    }

    #[test]
    fn planned_batch_folds_cleanly(r in registry(), facet in owner()) {
        // Whatever the planner accepts must fold onto the snapshot it was
        // planned against.
        let planner = CutPlanner::new().with_facet(Facet::new(facet, SIGNATURES).unwrap());
        for action in [CutAction::Add, CutAction::Replace, CutAction::Remove] {
            if let Ok(plan) = planner.plan(&r, &[UpgradeRequest::new(facet, action)]) {
                prop_assert!(r.folded(&plan.batch.cuts).is_ok());
            }
        }
    }
}
