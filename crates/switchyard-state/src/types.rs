//! Persisted records for the Switchyard state store.

use serde::{Deserialize, Serialize};
use switchyard_core::{CapacityState, RouteId, RoutePools, RouteSpec, WeightSplit};

/// A weighted routing rule with its two target pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub route: RouteId,
    /// Path pattern the rule matches.
    pub path: String,
    /// Rule evaluation order on the listener.
    pub priority: u32,
    /// Bound once at provisioning, never replaced.
    pub pools: RoutePools,
    /// Currently committed split.
    pub split: WeightSplit,
    /// Unix timestamp (seconds) of the last commit.
    pub updated_at: u64,
}

impl RouteRule {
    /// Fresh rule for a newly provisioned route: all traffic on the
    /// function backend.
    pub fn provisioned(spec: &RouteSpec, now: u64) -> Self {
        let pools = spec.pools();
        Self {
            route: spec.id.clone(),
            path: spec.path.clone(),
            priority: spec.priority,
            split: pools.split(1, 0),
            pools,
            updated_at: now,
        }
    }
}

/// Container capacity for one route's container service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub route: RouteId,
    pub state: CapacityState,
    pub updated_at: u64,
}
