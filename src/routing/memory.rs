//! In-memory routing table for testing.
//!
//! Applies batches all-or-nothing with the same rules as the local registry,
//! and can be scripted to reject, stall confirmations, drop the submit
//! response after committing, or mutate underneath the kernel like a
//! concurrent operator would.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{CommitStatus, RoutingTable, Submission};
use crate::error::CutError;
use crate::registry::SelectorRegistry;
use crate::types::{CutBatch, FacetAddress, FacetCut, InitCall};

/// Error type for the in-memory routing table.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryRoutingError {
    /// The table serves a different proxy.
    #[error("Unknown diamond: {0}")]
    UnknownDiamond(FacetAddress),
    /// Confirmation requested for a submission that was never made.
    #[error("Unknown submission: {0}")]
    UnknownSubmission(String),
    /// The connection dropped before the submit response arrived.
    #[error("Connection reset while submitting batch {0}")]
    ConnectionReset(String),
}

#[derive(Debug, Default)]
struct TableState {
    routes: SelectorRegistry,
    outcomes: BTreeMap<String, CommitStatus>,
    init_calls: Vec<InitCall>,
    reject_next: Option<String>,
    stall_confirmations: bool,
    drop_next_response: bool,
    submissions: usize,
}

/// Routing table held in memory.
#[derive(Debug)]
pub struct InMemoryRoutingTable {
    diamond: FacetAddress,
    state: Mutex<TableState>,
}

impl InMemoryRoutingTable {
    /// Empty routing table for `diamond`.
    pub fn new(diamond: FacetAddress) -> Self {
        Self::with_routes(diamond, SelectorRegistry::new())
    }

    /// Routing table for `diamond` starting from `routes`.
    pub fn with_routes(diamond: FacetAddress, routes: SelectorRegistry) -> Self {
        Self {
            diamond,
            state: Mutex::new(TableState {
                routes,
                ..TableState::default()
            }),
        }
    }

    /// Current routes.
    pub fn snapshot(&self) -> SelectorRegistry {
        self.state.lock().routes.clone()
    }

    /// Init calls executed so far, in order.
    pub fn init_calls(&self) -> Vec<InitCall> {
        self.state.lock().init_calls.clone()
    }

    /// Number of batches submitted.
    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    /// Reject the next submission with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.state.lock().reject_next = Some(reason.into());
    }

    /// When set, batches still commit but `confirm` never returns.
    pub fn stall_confirmations(&self, stall: bool) {
        self.state.lock().stall_confirmations = stall;
    }

    /// Commit the next submission, then fail it as if the connection
    /// dropped before the response arrived.
    pub fn drop_next_response(&self) {
        self.state.lock().drop_next_response = true;
    }

    /// Mutate the table outside the kernel (another operator's upgrade).
    pub fn apply_external(&self, cut: &FacetCut) -> Result<(), CutError> {
        self.state.lock().routes.apply(cut)
    }

    fn check_diamond(&self, diamond: &FacetAddress) -> Result<(), InMemoryRoutingError> {
        if *diamond != self.diamond {
            return Err(InMemoryRoutingError::UnknownDiamond(*diamond));
        }
        Ok(())
    }
}

#[async_trait]
impl RoutingTable for InMemoryRoutingTable {
    type Error = InMemoryRoutingError;

    async fn routes(&self, diamond: &FacetAddress) -> Result<SelectorRegistry, Self::Error> {
        self.check_diamond(diamond)?;
        Ok(self.snapshot())
    }

    async fn submit(&self, diamond: &FacetAddress, batch: &CutBatch) -> Result<Submission, Self::Error> {
        self.check_diamond(diamond)?;

        let tx_id = format!("0x{}", uuid::Uuid::new_v4().simple());
        let mut state = self.state.lock();
        state.submissions += 1;

        let status = if let Some(reason) = state.reject_next.take() {
            CommitStatus::Rejected { reason }
        } else {
            match state.routes.folded(&batch.cuts) {
                Ok(next) => {
                    state.routes = next;
                    if let Some(init) = &batch.init {
                        state.init_calls.push(init.clone());
                    }
                    CommitStatus::Committed
                }
                Err(failure) => CommitStatus::Rejected {
                    reason: format!("cut #{}: {}", failure.cut_index, failure.error),
                },
            }
        };
        state.outcomes.insert(tx_id.clone(), status);

        if std::mem::take(&mut state.drop_next_response) {
            return Err(InMemoryRoutingError::ConnectionReset(batch.batch_id()));
        }

        Ok(Submission {
            tx_id,
            diamond: *diamond,
            batch_id: batch.batch_id(),
            submitted_at: Utc::now(),
        })
    }

    async fn confirm(&self, submission: &Submission) -> Result<CommitStatus, Self::Error> {
        let (stall, outcome) = {
            let state = self.state.lock();
            (state.stall_confirmations, state.outcomes.get(&submission.tx_id).cloned())
        };

        if stall {
            std::future::pending::<()>().await;
        }
        outcome.ok_or_else(|| InMemoryRoutingError::UnknownSubmission(submission.tx_id.clone()))
    }
}
