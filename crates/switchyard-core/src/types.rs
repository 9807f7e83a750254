//! Domain types shared by the store, the migration controllers, and the API.
//!
//! All types are serializable to/from JSON so they can be persisted in
//! redb value columns and returned from REST handlers unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a migratable route (e.g. `route1`).
pub type RouteId = String;

// ── Backend ───────────────────────────────────────────────────────

/// One of the two compute backends behind a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    /// Low-latency, always-warm function backend.
    Function,
    /// Higher-throughput container backend that must be hydrated first.
    Container,
}

impl BackendId {
    pub const ALL: [BackendId; 2] = [BackendId::Function, BackendId::Container];

    /// The backend on the other side of the cutover.
    pub fn other(self) -> Self {
        match self {
            BackendId::Function => BackendId::Container,
            BackendId::Container => BackendId::Function,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendId::Function => "function",
            BackendId::Container => "container",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target string that names neither backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend {0:?}")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendId {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "function" => Ok(BackendId::Function),
            "container" => Ok(BackendId::Container),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

// ── Pools ─────────────────────────────────────────────────────────

/// One weighted target group behind the routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutePool {
    /// Opaque routing-layer handle (target group id, ARN, ...).
    pub handle: String,
    pub backend: BackendId,
}

/// The two pools of a route, fixed for the route's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePools {
    function: RoutePool,
    container: RoutePool,
}

impl RoutePools {
    pub fn new(function_handle: &str, container_handle: &str) -> Self {
        Self {
            function: RoutePool {
                handle: function_handle.to_string(),
                backend: BackendId::Function,
            },
            container: RoutePool {
                handle: container_handle.to_string(),
                backend: BackendId::Container,
            },
        }
    }

    pub fn get(&self, backend: BackendId) -> &RoutePool {
        match backend {
            BackendId::Function => &self.function,
            BackendId::Container => &self.container,
        }
    }

    /// Build a split with the given weights, bound to these pools.
    pub fn split(&self, function_weight: u32, container_weight: u32) -> WeightSplit {
        WeightSplit {
            function: WeightEntry {
                pool: self.function.handle.clone(),
                weight: function_weight,
            },
            container: WeightEntry {
                pool: self.container.handle.clone(),
                weight: container_weight,
            },
        }
    }

    /// Binary all-or-nothing split: `backend` gets weight 1, the other 0.
    pub fn exclusive(&self, backend: BackendId) -> WeightSplit {
        match backend {
            BackendId::Function => self.split(1, 0),
            BackendId::Container => self.split(0, 1),
        }
    }
}

// ── Weights ───────────────────────────────────────────────────────

/// Weight assigned to one pool. A weight of 0 receives no new traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightEntry {
    pub pool: String,
    pub weight: u32,
}

/// The full weight split of a routing rule: exactly one entry per backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightSplit {
    pub function: WeightEntry,
    pub container: WeightEntry,
}

impl WeightSplit {
    pub fn entry(&self, backend: BackendId) -> &WeightEntry {
        match backend {
            BackendId::Function => &self.function,
            BackendId::Container => &self.container,
        }
    }

    pub fn weight(&self, backend: BackendId) -> u32 {
        self.entry(backend).weight
    }

    /// The unique backend with nonzero weight.
    ///
    /// Returns `None` for a blackout (both zero) or a split-brain (both
    /// nonzero) split.
    pub fn active(&self) -> Option<BackendId> {
        match (self.function.weight > 0, self.container.weight > 0) {
            (true, false) => Some(BackendId::Function),
            (false, true) => Some(BackendId::Container),
            _ => None,
        }
    }

    /// Whether `backend` is the sole backend receiving traffic.
    pub fn is_exclusive(&self, backend: BackendId) -> bool {
        self.active() == Some(backend)
    }
}

// ── Capacity ──────────────────────────────────────────────────────

/// Desired and observed replica counts of the container backend.
///
/// `running` converges toward `desired` asynchronously and may lag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityState {
    pub desired: u32,
    pub running: u32,
}

impl CapacityState {
    pub fn meets(&self, threshold: u32) -> bool {
        self.running >= threshold
    }
}

// ── Requests ──────────────────────────────────────────────────────

/// Wire form of a migration request: `{"target": "function" | "container"}`.
///
/// The target stays a raw string until branch selection so an unknown
/// target can be rejected without touching any collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub target: String,
}

impl MigrationRequest {
    pub fn to(target: BackendId) -> Self {
        Self {
            target: target.as_str().to_string(),
        }
    }

    pub fn backend(&self) -> Result<BackendId, UnknownBackend> {
        self.target.parse()
    }
}

/// Epoch seconds for `updated_at` stamps.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
