//! Cut planner.
//!
//! Turns an ordered list of upgrade requests into a `CutBatch` that moves
//! the registry from a snapshot to the requested state.
//!
//! ## Algorithm
//!
//! 1. Resolve each request's signatures against its facet's interface
//! 2. Classify every selector against a working copy of the snapshot:
//!    - eligible: the declared action's precondition holds
//!    - no-op: already owned by the requested facet (dropped, with a diagnostic)
//!    - mismatch: anything else fails the whole plan with `ActionMismatch`
//! 3. Advance the working copy by the request's cut, so later requests see
//!    the effect of earlier ones
//! 4. Group cuts by (facet address, action), preserving request order
//!
//! Planning never touches the snapshot it was given.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CutError;
use crate::interface::{resolve_signatures, FacetInterfaceSource};
use crate::registry::SelectorRegistry;
use crate::types::{
    CutAction, CutBatch, Facet, FacetAddress, FacetCut, InitCall, Selector, SelectorState,
    UpgradeRequest,
};

/// Why a selector was left out of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanDiagnostic {
    /// The selector is already routed to the requested facet.
    AlreadyOwnedBySameFacet {
        /// Position of the request in the input.
        request_index: usize,
        /// Signature as resolved from the facet.
        signature: String,
        /// Selector that was dropped.
        selector: Selector,
        /// Requested facet (also the current owner).
        facet: FacetAddress,
        /// Declared action.
        action: CutAction,
    },
}

/// Planner output: the batch plus diagnostics for dropped selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Batch ready for application.
    pub batch: CutBatch,
    /// Dropped no-ops.
    pub diagnostics: Vec<PlanDiagnostic>,
}

impl Plan {
    /// Whether the batch would change nothing.
    pub fn is_noop(&self) -> bool {
        self.batch.is_empty()
    }
}

enum Classification {
    Eligible,
    NoOp,
}

/// Computes cut batches from upgrade requests.
///
/// Holds the facet interfaces requests may name and the optional init call.
#[derive(Debug, Clone, Default)]
pub struct CutPlanner {
    facets: BTreeMap<FacetAddress, Facet>,
    init: Option<InitCall>,
}

impl CutPlanner {
    /// Create a planner with no known facets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a facet interface.
    pub fn register_facet(&mut self, facet: Facet) {
        self.facets.insert(facet.address, facet);
    }

    /// Builder-style `register_facet`.
    pub fn with_facet(mut self, facet: Facet) -> Self {
        self.register_facet(facet);
        self
    }

    /// Attach the batch's initialization call. At most one per batch.
    pub fn with_init(mut self, init: InitCall) -> Result<Self, CutError> {
        if self.init.is_some() {
            return Err(CutError::MultipleInitCalls);
        }
        self.init = Some(init);
        Ok(self)
    }

    /// Interface registered for an address.
    pub fn facet(&self, address: &FacetAddress) -> Result<&Facet, CutError> {
        self.facets
            .get(address)
            .ok_or(CutError::UnknownFacet(*address))
    }

    /// Plan a batch against `snapshot`.
    pub fn plan(
        &self,
        snapshot: &SelectorRegistry,
        requests: &[UpgradeRequest],
    ) -> Result<Plan, CutError> {
        let mut working = snapshot.clone();
        let mut cuts: Vec<FacetCut> = Vec::new();
        let mut diagnostics = Vec::new();

        for (request_index, request) in requests.iter().enumerate() {
            let facet = self.facet(&request.facet)?;
            let signatures = resolve_signatures(facet, &request.selection)?;

            let mut eligible = Vec::with_capacity(signatures.len());
            for signature in &signatures {
                let selector = signature.selector();
                match classify(&working, request, selector)? {
                    Classification::Eligible => {
                        debug!(
                            request_index,
                            signature = %signature,
                            selector = %selector,
                            facet = %request.facet,
                            action = %request.action,
                            "selector eligible"
                        );
                        eligible.push(selector);
                    }
                    Classification::NoOp => {
                        warn!(
                            request_index,
                            signature = %signature,
                            selector = %selector,
                            facet = %request.facet,
                            action = %request.action,
                            "selector already owned by requested facet, dropping"
                        );
                        diagnostics.push(PlanDiagnostic::AlreadyOwnedBySameFacet {
                            request_index,
                            signature: signature.to_string(),
                            selector,
                            facet: request.facet,
                            action: request.action,
                        });
                    }
                }
            }

            if eligible.is_empty() {
                continue;
            }

            let cut = FacetCut::new(request.cut_target(), request.action, eligible);
            // Classification already checked every precondition.
            working.apply(&cut)?;
            merge_cut(&mut cuts, cut);
        }

        let mut batch = CutBatch::new(snapshot.fingerprint());
        batch.cuts = cuts;
        batch.init = self.init.clone();

        debug!(
            batch_id = %batch.batch_id(),
            cuts = batch.cuts.len(),
            selectors = batch.selector_count(),
            dropped = diagnostics.len(),
            has_init = batch.init.is_some(),
            "plan complete"
        );

        Ok(Plan { batch, diagnostics })
    }

    /// Fetch every facet named by `requests` from `source` (once per facet),
    /// then plan.
    ///
    /// Facets already registered on the planner are not fetched again.
    pub async fn plan_from_source<S>(
        &self,
        source: &S,
        snapshot: &SelectorRegistry,
        requests: &[UpgradeRequest],
    ) -> Result<Plan, CutError>
    where
        S: FacetInterfaceSource + ?Sized,
    {
        let mut planner = self.clone();
        let wanted: BTreeSet<FacetAddress> = requests.iter().map(|r| r.facet).collect();

        for address in wanted {
            if planner.facets.contains_key(&address) {
                continue;
            }
            let facet = source
                .facet(&address)
                .await
                .map_err(CutError::from_source)?
                .ok_or(CutError::UnknownFacet(address))?;
            planner.register_facet(facet);
        }

        planner.plan(snapshot, requests)
    }
}

fn classify(
    working: &SelectorRegistry,
    request: &UpgradeRequest,
    selector: Selector,
) -> Result<Classification, CutError> {
    let state = working.state(&selector);
    let same_facet = state == SelectorState::OwnedBy(request.facet);

    match (request.action, state) {
        (CutAction::Add, SelectorState::Unowned) => Ok(Classification::Eligible),
        (CutAction::Replace, SelectorState::OwnedBy(_)) if !same_facet => Ok(Classification::Eligible),
        (CutAction::Remove, SelectorState::OwnedBy(_)) if same_facet => Ok(Classification::Eligible),
        (CutAction::Add | CutAction::Replace, _) if same_facet => Ok(Classification::NoOp),
        (declared, actual) => Err(CutError::ActionMismatch {
            selector,
            declared,
            actual,
        }),
    }
}

/// Merge `cut` into an earlier cut with the same (facet, action) key when no
/// later cut touches its selectors; otherwise append it.
fn merge_cut(cuts: &mut Vec<FacetCut>, cut: FacetCut) {
    let target = cuts
        .iter()
        .position(|c| c.facet_address == cut.facet_address && c.action == cut.action);

    if let Some(index) = target {
        let disturbed = cuts[index + 1..]
            .iter()
            .any(|later| cut.selectors.iter().any(|s| later.touches(s)));
        if !disturbed {
            cuts[index].selectors.extend(cut.selectors);
            return;
        }
    }
    cuts.push(cut);
}
