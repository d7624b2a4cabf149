//! Error taxonomy for planning and applying cuts.
//!
//! ## Classes
//!
//! | Class | Variants | Raised | Retry |
//! |-------|----------|--------|-------|
//! | Planning | `InvalidSignatureFormat`, `UnknownSignature`, `SelectorAlreadyOwned`, `SelectorNotReplaceable`, `ActionMismatch`, ... | before any external call | fix the request and re-plan |
//! | Pre-submission | `StalePlan`, `ResyncRequired`, `RoutingTable` | before submission | re-read state and re-plan |
//! | Post-submission | `UpgradeRejected`, `RegistryDrift`, `OutcomeUnknown` | after submission | never automatically |
//!
//! A transport failure while handing the batch over is `OutcomeUnknown`
//! without a tx id: the batch may have landed.

use crate::types::{CutAction, FacetAddress, Selector, SelectorState};

/// Errors raised by the cut kernel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CutError {
    /// Signature is not in canonical `name(type,...)` form.
    #[error("Invalid signature format '{signature}': {reason}")]
    InvalidSignatureFormat {
        /// Offending input.
        signature: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A requested signature is not exposed by the facet.
    #[error("Signature '{signature}' is not exposed by facet {facet}")]
    UnknownSignature {
        /// Facet that was asked.
        facet: FacetAddress,
        /// Requested signature.
        signature: String,
    },

    /// Two signatures of one facet hash to the same selector.
    #[error("Selector collision on {selector}: '{first}' and '{second}'")]
    SelectorCollision {
        /// Shared selector.
        selector: Selector,
        /// First signature seen.
        first: String,
        /// Colliding signature.
        second: String,
    },

    /// No interface is known for a facet named by a request.
    #[error("No interface known for facet {0}")]
    UnknownFacet(FacetAddress),

    /// `Add` of a selector that is already routed.
    #[error("Selector {selector} is already owned by facet {owner}")]
    SelectorAlreadyOwned {
        /// Selector being added.
        selector: Selector,
        /// Current owner.
        owner: FacetAddress,
    },

    /// `Replace` of a selector that is unowned or already owned by the target.
    #[error("Selector {selector} is not replaceable ({state})")]
    SelectorNotReplaceable {
        /// Selector being replaced.
        selector: Selector,
        /// Its current state.
        state: SelectorState,
    },

    /// `Remove` of a selector that is not routed.
    #[error("Selector {0} is not owned and cannot be removed")]
    SelectorNotOwned(Selector),

    /// `Remove` cut naming a non-null facet address.
    #[error("Remove cut must target the null address, got {0}")]
    InvalidRemoveTarget(FacetAddress),

    /// `Add`/`Replace` cut naming the null address.
    #[error("{0} cut cannot target the null address")]
    NullFacetAddress(CutAction),

    /// Declared action does not match the selector's observed state.
    #[error("Action mismatch for selector {selector}: declared {declared}, but selector is {actual}")]
    ActionMismatch {
        /// Selector that failed classification.
        selector: Selector,
        /// Action the caller asked for.
        declared: CutAction,
        /// State observed in the registry snapshot.
        actual: SelectorState,
    },

    /// Malformed initialization call.
    #[error("Invalid init call: {0}")]
    InvalidInitCall(String),

    /// More than one initialization call attached to a batch.
    #[error("A batch carries at most one init call")]
    MultipleInitCalls,

    /// Nothing to submit.
    #[error("Batch contains no cuts and no init call")]
    EmptyBatch,

    /// The batch was planned against a registry state that is no longer current.
    #[error("Stale plan: planned against {expected}, current state is {actual}")]
    StalePlan {
        /// Fingerprint the batch was planned against.
        expected: String,
        /// Fingerprint observed now.
        actual: String,
    },

    /// A previous application ended in an unknown or divergent state.
    #[error("Registry must be resynchronised from the routing table before applying")]
    ResyncRequired,

    /// The routing table reported the batch as failed.
    #[error("Upgrade rejected{}: {reason}", .tx_id.as_deref().map(|t| format!(" (tx {t})")).unwrap_or_default())]
    UpgradeRejected {
        /// Submission identifier, when one was issued.
        tx_id: Option<String>,
        /// Diagnostic from the routing table.
        reason: String,
    },

    /// The batch committed externally but does not fold onto the local registry.
    #[error("Registry drift after tx {tx_id}: cut #{cut_index} ({action} {facet}) does not fold locally: {cause}")]
    RegistryDrift {
        /// Committed submission.
        tx_id: String,
        /// Index of the first cut that failed to fold.
        cut_index: usize,
        /// Action of that cut.
        action: CutAction,
        /// Target of that cut.
        facet: FacetAddress,
        /// Why folding failed.
        cause: Box<CutError>,
    },

    /// Confirmation was not observed; the batch may or may not have committed.
    #[error("Outcome of {} unknown after {waited_ms}ms; re-read routing state before retrying", .tx_id.as_deref().map(|t| format!("tx {t}")).unwrap_or_else(|| "submission".to_string()))]
    OutcomeUnknown {
        /// Submission whose outcome is unknown; `None` if submitting
        /// itself failed before a tx id came back.
        tx_id: Option<String>,
        /// How long the applier waited.
        waited_ms: u64,
    },

    /// Transport failure talking to the routing table before anything was
    /// submitted.
    #[error("Routing table error: {0}")]
    RoutingTable(String),

    /// Failure fetching a facet interface.
    #[error("Interface source error: {0}")]
    InterfaceSource(String),

    /// Failure loading or saving registry state.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Malformed address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed selector.
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Malformed ABI document.
    #[error("Invalid ABI: {0}")]
    Abi(String),
}

impl CutError {
    /// Create a routing table error from any error type.
    pub fn from_routing<E: std::error::Error>(e: E) -> Self {
        Self::RoutingTable(e.to_string())
    }

    /// Create an interface source error from any error type.
    pub fn from_source<E: std::error::Error>(e: E) -> Self {
        Self::InterfaceSource(e.to_string())
    }

    /// Create a persistence error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Persistence(e.to_string())
    }

    /// Raised while planning, before anything is sent anywhere.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignatureFormat { .. }
                | Self::UnknownSignature { .. }
                | Self::SelectorCollision { .. }
                | Self::UnknownFacet(_)
                | Self::SelectorAlreadyOwned { .. }
                | Self::SelectorNotReplaceable { .. }
                | Self::SelectorNotOwned(_)
                | Self::InvalidRemoveTarget(_)
                | Self::NullFacetAddress(_)
                | Self::ActionMismatch { .. }
                | Self::InvalidInitCall(_)
                | Self::MultipleInitCalls
        )
    }

    /// Raised after the batch was handed to the routing table.
    pub fn is_post_submission(&self) -> bool {
        matches!(
            self,
            Self::UpgradeRejected { .. } | Self::RegistryDrift { .. } | Self::OutcomeUnknown { .. }
        )
    }

    /// Whether the caller may correct the input and try again without
    /// first re-reading external state.
    pub fn is_retryable(&self) -> bool {
        self.is_planning_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let sel = Selector::from_bytes([1, 2, 3, 4]);
        let mismatch = CutError::ActionMismatch {
            selector: sel,
            declared: CutAction::Add,
            actual: SelectorState::OwnedBy(FacetAddress::repeat_byte(0xbb)),
        };
        assert!(mismatch.is_planning_error());
        assert!(mismatch.is_retryable());
        assert!(!mismatch.is_post_submission());

        let rejected = CutError::UpgradeRejected {
            tx_id: Some("tx-1".into()),
            reason: "reverted".into(),
        };
        assert!(rejected.is_post_submission());
        assert!(!rejected.is_retryable());

        let unknown = CutError::OutcomeUnknown {
            tx_id: Some("tx-2".into()),
            waited_ms: 10,
        };
        assert!(unknown.is_post_submission());
        assert!(!unknown.is_retryable());

        let lost = CutError::OutcomeUnknown {
            tx_id: None,
            waited_ms: 0,
        };
        assert!(lost.is_post_submission());
        assert!(!lost.is_planning_error());
        assert_eq!(
            lost.to_string(),
            "Outcome of submission unknown after 0ms; re-read routing state before retrying"
        );
    }

    #[test]
    fn test_messages_carry_context() {
        let sel = Selector::from_bytes([0xde, 0xad, 0xbe, 0xef]);
        let err = CutError::ActionMismatch {
            selector: sel,
            declared: CutAction::Add,
            actual: SelectorState::OwnedBy(FacetAddress::repeat_byte(0xbb)),
        };
        let msg = err.to_string();
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("Add"));
        assert!(msg.contains("owned by 0xbbbb"));

        let rejected = CutError::UpgradeRejected {
            tx_id: Some("tx-9".into()),
            reason: "LibDiamondCut: Incorrect FacetCutAction".into(),
        };
        assert_eq!(
            rejected.to_string(),
            "Upgrade rejected (tx tx-9): LibDiamondCut: Incorrect FacetCutAction"
        );
    }
}
