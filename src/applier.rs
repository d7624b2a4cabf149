//! Cut applier.
//!
//! Submits a planned batch to the routing table and keeps the local registry
//! in step with it.
//!
//! ## Sequence
//!
//! All steps run inside one critical section per applier:
//!
//! 1. Refuse if a previous application left the registry in doubt
//! 2. Verify the batch was planned against the current local registry
//! 3. Optionally re-read the live routing table and verify it too
//! 4. Submit, then wait for the outcome under a timeout
//! 5. On commit, fold every cut onto the local registry and persist it
//!
//! Once the routing table has committed, `apply` always returns a
//! [`CutReceipt`]; a failed save is reported in
//! [`CutReceipt::persist_error`] rather than as an error.
//!
//! ## Failure handling
//!
//! - Rejected: local state untouched, `UpgradeRejected`
//! - Submit transport failure, or no outcome within the timeout:
//!   `OutcomeUnknown`; the applier refuses further batches until
//!   [`CutApplier::resync`] re-reads the routing table
//! - Dropping the `apply` future after submission: same resync rule
//! - Committed but not foldable locally: `RegistryDrift`; same resync rule
//!
//! Nothing is ever resubmitted automatically.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::ApplierConfig;
use crate::error::CutError;
use crate::registry::SelectorRegistry;
use crate::routing::{CommitStatus, RoutingTable};
use crate::store::RegistryStore;
use crate::types::{CutBatch, FacetAddress};

/// Proof of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutReceipt {
    /// Unique receipt identifier.
    pub receipt_id: uuid::Uuid,
    /// Identifier of the applied batch.
    pub batch_id: String,
    /// Routing table transaction.
    pub tx_id: String,
    /// Proxy that was upgraded.
    pub diamond: FacetAddress,
    /// Number of cuts applied.
    pub cuts_applied: usize,
    /// Number of selectors whose routing changed.
    pub selectors_changed: usize,
    /// Whether an init call ran.
    pub init_called: bool,
    /// Registry fingerprint after the batch.
    pub registry_fingerprint: String,
    /// When the commit was observed.
    pub committed_at: DateTime<Utc>,
    /// Set when the registry store failed to save the new registry. The
    /// routing table and the in-memory registry are still up to date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl CutReceipt {
    /// Whether the new registry reached the store.
    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

#[derive(Debug)]
struct ApplierState {
    registry: SelectorRegistry,
    /// Set while a submission is in flight; cleared only by a definitive
    /// outcome or a resync. Survives cancellation of `apply`.
    in_doubt: bool,
}

/// Applies cut batches to a routing table.
pub struct CutApplier<R: RoutingTable, S: RegistryStore> {
    routing: Arc<R>,
    store: Arc<S>,
    diamond: FacetAddress,
    config: ApplierConfig,
    state: Mutex<ApplierState>,
}

impl<R: RoutingTable, S: RegistryStore> CutApplier<R, S> {
    /// Create an applier around an already-loaded registry.
    pub fn new(
        routing: Arc<R>,
        store: Arc<S>,
        diamond: FacetAddress,
        registry: SelectorRegistry,
        config: ApplierConfig,
    ) -> Self {
        Self {
            routing,
            store,
            diamond,
            config,
            state: Mutex::new(ApplierState {
                registry,
                in_doubt: false,
            }),
        }
    }

    /// Create an applier, loading the registry from `store`.
    pub async fn open(
        routing: Arc<R>,
        store: Arc<S>,
        diamond: FacetAddress,
        config: ApplierConfig,
    ) -> Result<Self, CutError> {
        let registry = store.load().await.map_err(CutError::from_store)?;
        info!(
            diamond = %diamond,
            selectors = registry.len(),
            fingerprint = %registry.fingerprint(),
            "cut applier opened"
        );
        Ok(Self::new(routing, store, diamond, registry, config))
    }

    /// Proxy this applier manages.
    pub fn diamond(&self) -> FacetAddress {
        self.diamond
    }

    /// Copy of the local registry, for planning.
    pub async fn snapshot(&self) -> SelectorRegistry {
        self.state.lock().await.registry.clone()
    }

    /// Whether the applier must be resynchronised before the next batch.
    pub async fn needs_resync(&self) -> bool {
        self.state.lock().await.in_doubt
    }

    /// Replace the local registry with the routing table's live routes and
    /// persist it. Clears the in-doubt flag.
    pub async fn resync(&self) -> Result<SelectorRegistry, CutError> {
        let mut state = self.state.lock().await;

        let live = self
            .routing
            .routes(&self.diamond)
            .await
            .map_err(CutError::from_routing)?;
        self.store.save(&live).await.map_err(CutError::from_store)?;

        info!(
            diamond = %self.diamond,
            previous = %state.registry.fingerprint(),
            current = %live.fingerprint(),
            "registry resynchronised from routing table"
        );
        state.registry = live.clone();
        state.in_doubt = false;
        Ok(live)
    }

    /// Apply a planned batch.
    pub async fn apply(&self, batch: &CutBatch) -> Result<CutReceipt, CutError> {
        if batch.is_empty() {
            return Err(CutError::EmptyBatch);
        }

        let mut state = self.state.lock().await;
        if state.in_doubt {
            return Err(CutError::ResyncRequired);
        }

        let batch_id = batch.batch_id();
        let local = state.registry.fingerprint();
        if local != batch.base_fingerprint {
            warn!(batch_id = %batch_id, expected = %batch.base_fingerprint, actual = %local, "local registry moved since planning");
            return Err(CutError::StalePlan {
                expected: batch.base_fingerprint.clone(),
                actual: local,
            });
        }

        if self.config.drift_check {
            let live = self
                .routing
                .routes(&self.diamond)
                .await
                .map_err(CutError::from_routing)?
                .fingerprint();
            if live != batch.base_fingerprint {
                warn!(batch_id = %batch_id, expected = %batch.base_fingerprint, actual = %live, "routing table moved since planning");
                return Err(CutError::StalePlan {
                    expected: batch.base_fingerprint.clone(),
                    actual: live,
                });
            }
        }

        state.in_doubt = true;
        let started = Instant::now();
        let submission = self
            .routing
            .submit(&self.diamond, batch)
            .await
            .map_err(|e| {
                // No tx id came back, but the batch may have landed.
                error!(batch_id = %batch_id, error = %e, "submission failed; outcome unknown");
                CutError::OutcomeUnknown {
                    tx_id: None,
                    waited_ms: started.elapsed().as_millis() as u64,
                }
            })?;

        info!(
            diamond = %self.diamond,
            batch_id = %batch_id,
            tx_id = %submission.tx_id,
            cuts = batch.cuts.len(),
            selectors = batch.selector_count(),
            "batch submitted"
        );

        let status = match tokio::time::timeout(
            self.config.confirmation_timeout,
            self.routing.confirm(&submission),
        )
        .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                error!(tx_id = %submission.tx_id, error = %e, "confirmation failed");
                return Err(CutError::OutcomeUnknown {
                    tx_id: Some(submission.tx_id),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(_) => {
                error!(
                    tx_id = %submission.tx_id,
                    timeout_secs = self.config.confirmation_timeout.as_secs(),
                    "confirmation timed out; outcome unknown"
                );
                return Err(CutError::OutcomeUnknown {
                    tx_id: Some(submission.tx_id),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        if let CommitStatus::Rejected { reason } = status {
            state.in_doubt = false;
            error!(tx_id = %submission.tx_id, reason = %reason, "upgrade rejected");
            return Err(CutError::UpgradeRejected {
                tx_id: Some(submission.tx_id),
                reason,
            });
        }

        let next = state.registry.folded(&batch.cuts).map_err(|failure| {
            let cut = &batch.cuts[failure.cut_index];
            error!(
                tx_id = %submission.tx_id,
                cut_index = failure.cut_index,
                action = %cut.action,
                facet = %cut.facet_address,
                error = %failure.error,
                "committed batch does not fold onto local registry"
            );
            CutError::RegistryDrift {
                tx_id: submission.tx_id.clone(),
                cut_index: failure.cut_index,
                action: cut.action,
                facet: cut.facet_address,
                cause: Box::new(failure.error),
            }
        })?;

        state.registry = next;
        state.in_doubt = false;
        let fingerprint = state.registry.fingerprint();

        record_commit_metrics(batch, started.elapsed().as_millis() as u64);
        info!(
            diamond = %self.diamond,
            batch_id = %batch_id,
            tx_id = %submission.tx_id,
            fingerprint = %fingerprint,
            "batch committed"
        );

        // The routing table already changed; a failed save leaves the
        // in-memory registry correct and only the store stale.
        let persist_error = match self.store.save(&state.registry).await {
            Ok(()) => None,
            Err(e) => {
                error!(
                    batch_id = %batch_id,
                    tx_id = %submission.tx_id,
                    error = %e,
                    "committed registry not persisted"
                );
                Some(e.to_string())
            }
        };

        Ok(CutReceipt {
            receipt_id: uuid::Uuid::new_v4(),
            batch_id,
            tx_id: submission.tx_id,
            diamond: self.diamond,
            cuts_applied: batch.cuts.len(),
            selectors_changed: batch.selector_count(),
            init_called: batch.init.is_some(),
            registry_fingerprint: fingerprint,
            committed_at: Utc::now(),
            persist_error,
        })
    }
}

fn record_commit_metrics(batch: &CutBatch, confirm_ms: u64) {
    info!(
        target: "diamond_cut::metrics",
        metric_type = "commit",
        cuts = batch.cuts.len(),
        selectors = batch.selector_count(),
        has_init = batch.init.is_some(),
        confirm_ms = confirm_ms,
        "commit_metric"
    );
}
