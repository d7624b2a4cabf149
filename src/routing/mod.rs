//! External routing table boundary.
//!
//! The routing table is the proxy's own selector → facet mapping. It exposes
//! a single mutating entry point that applies a whole `CutBatch` atomically,
//! plus a read of the current routes. The kernel relies on that atomicity
//! and verifies the reported outcome; it does not implement rollback itself.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::SelectorRegistry;
use crate::types::{CutBatch, FacetAddress};

/// Handle for a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Transaction identifier assigned by the routing table.
    pub tx_id: String,
    /// Proxy the batch was sent to.
    pub diamond: FacetAddress,
    /// Identifier of the submitted batch.
    pub batch_id: String,
    /// When the submission was accepted for processing.
    pub submitted_at: DateTime<Utc>,
}

/// Final outcome reported by the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitStatus {
    /// Every cut and the init call took effect.
    Committed,
    /// Nothing took effect.
    Rejected {
        /// Human-readable diagnostic.
        reason: String,
    },
}

/// The proxy's routing table.
#[async_trait]
pub trait RoutingTable: Send + Sync {
    /// Error type for transport failures.
    type Error: std::error::Error + Send + Sync;

    /// Read the live selector → facet mapping of `diamond`.
    async fn routes(&self, diamond: &FacetAddress) -> Result<SelectorRegistry, Self::Error>;

    /// Submit a batch to the single mutating entry point.
    async fn submit(&self, diamond: &FacetAddress, batch: &CutBatch) -> Result<Submission, Self::Error>;

    /// Wait for the outcome of a submission.
    ///
    /// May wait indefinitely; callers bound it with a timeout.
    async fn confirm(&self, submission: &Submission) -> Result<CommitStatus, Self::Error>;
}

pub use memory::{InMemoryRoutingError, InMemoryRoutingTable};
