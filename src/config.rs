//! Kernel configuration.
//!
//! Everything the applier needs to know about its environment is passed in
//! explicitly; nothing is read from ambient globals after start-up.
//!
//! ## Environment variables
//!
//! - `DIAMOND_ADDRESS`: proxy whose routing table is managed
//! - `CONFIRMATION_TIMEOUT_SECS`: how long to wait for a batch outcome (default: 120)
//! - `REGISTRY_PATH`: JSON file holding the persisted registry
//! - `DRIFT_CHECK`: re-read the routing table before submitting (default: true)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::FacetAddress;

/// Default confirmation timeout in seconds.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Settings for the cut applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplierConfig {
    /// Upper bound on waiting for a batch outcome.
    #[serde(with = "duration_secs")]
    pub confirmation_timeout: Duration,
    /// Re-read the live routing table and compare it with the plan's base
    /// before submitting.
    pub drift_check: bool,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            drift_check: true,
        }
    }
}

/// Top-level kernel configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Proxy whose routing table is managed.
    pub diamond_address: Option<FacetAddress>,
    /// Where the registry is persisted; `None` keeps it in memory only.
    pub registry_path: Option<PathBuf>,
    /// Applier settings.
    #[serde(default)]
    pub applier: ApplierConfig,
}

impl KernelConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults (with a warning) for anything missing or malformed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let diamond_address = lookup("DIAMOND_ADDRESS").and_then(|raw| {
            FacetAddress::from_hex(&raw)
                .map_err(|e| warn!(error = %e, "DIAMOND_ADDRESS is invalid, ignoring"))
                .ok()
        });
        if diamond_address.is_none() {
            warn!("DIAMOND_ADDRESS not set; the applier cannot be started without it");
        }

        let confirmation_timeout = match lookup("CONFIRMATION_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(value = %raw, "CONFIRMATION_TIMEOUT_SECS invalid, using default");
                    Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS)
                }
            },
            None => Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
        };

        let drift_check = match lookup("DRIFT_CHECK").as_deref() {
            None => true,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => {
                warn!("DRIFT_CHECK disabled: stale plans will only be caught by the routing table");
                false
            }
            Some(other) => {
                warn!(value = %other, "DRIFT_CHECK not understood, keeping it enabled");
                true
            }
        };

        Self {
            diamond_address,
            registry_path: lookup("REGISTRY_PATH").map(PathBuf::from),
            applier: ApplierConfig {
                confirmation_timeout,
                drift_check,
            },
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
