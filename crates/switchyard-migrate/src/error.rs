//! Error types for migration collaborators and runs.

use switchyard_core::RouteId;
use switchyard_state::StateError;
use thiserror::Error;

/// Errors surfaced by the weight/capacity controllers and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("routing layer unavailable: {0}")]
    RoutingUnavailable(String),

    #[error("capacity backend unavailable: {0}")]
    CapacityUnavailable(String),

    #[error("invalid pool: {0}")]
    InvalidPool(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("migration already in progress for route {0}")]
    MigrationInProgress(RouteId),

    /// Never raised by a collaborator. A run that misses its readiness
    /// deadline ends in `RunStatus::TimedOut`; this variant only names
    /// that outcome's wire code.
    #[error("readiness deadline expired")]
    TimedOut,

    #[error("unknown route {0}")]
    UnknownRoute(RouteId),

    #[error("migration cancelled by shutdown")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl MigrationError {
    /// Stable snake_case code used as the wire `reason`.
    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::RoutingUnavailable(_) => "routing_unavailable",
            MigrationError::CapacityUnavailable(_) => "capacity_unavailable",
            MigrationError::InvalidPool(_) => "invalid_pool",
            MigrationError::InvalidRequest(_) => "invalid_request",
            MigrationError::MigrationInProgress(_) => "migration_in_progress",
            MigrationError::TimedOut => "timed_out",
            MigrationError::UnknownRoute(_) => "unknown_route",
            MigrationError::Cancelled => "cancelled",
            MigrationError::Internal(_) => "internal",
        }
    }

    /// Whether the error means a collaborator could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            MigrationError::RoutingUnavailable(_) | MigrationError::CapacityUnavailable(_)
        )
    }

    /// Map a store error raised while touching the routing table.
    pub fn from_routing(err: StateError) -> Self {
        match err {
            StateError::StalePool(msg) | StateError::NotFound(msg) => {
                MigrationError::InvalidPool(msg)
            }
            other => MigrationError::RoutingUnavailable(other.to_string()),
        }
    }

    /// Map a store error raised while touching the capacity table.
    pub fn from_capacity(err: StateError) -> Self {
        MigrationError::CapacityUnavailable(err.to_string())
    }
}
