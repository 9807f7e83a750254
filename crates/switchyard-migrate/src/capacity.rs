//! Capacity controller — desired/running replica counts of the container
//! backend.
//!
//! `set_desired` only records intent; an external scaler moves `running`
//! toward it on its own schedule. `get_state` is a point-in-time read.

use async_trait::async_trait;
use switchyard_core::{BackendId, CapacityState, RouteId};
use switchyard_state::StateStore;
use tracing::info;

use crate::error::MigrationError;

/// Access to the capacity backend for one route's container service.
#[async_trait]
pub trait CapacityController: Send + Sync {
    /// Record a new desired replica count. Returns without waiting for
    /// convergence.
    async fn set_desired(&self, backend: BackendId, count: u32) -> Result<(), MigrationError>;

    /// Read the current desired/running counts.
    async fn get_state(&self, backend: BackendId) -> Result<CapacityState, MigrationError>;
}

/// The function backend is always warm and has no capacity to manage.
fn require_container(backend: BackendId) -> Result<(), MigrationError> {
    match backend {
        BackendId::Container => Ok(()),
        BackendId::Function => Err(MigrationError::InvalidRequest(
            "the function backend has no capacity state".to_string(),
        )),
    }
}

/// Capacity controller for one route, backed by the embedded state store.
#[derive(Clone)]
pub struct StoreCapacity {
    store: StateStore,
    route: RouteId,
}

impl StoreCapacity {
    pub fn new(store: StateStore, route: &str) -> Self {
        Self {
            store,
            route: route.to_string(),
        }
    }
}

#[async_trait]
impl CapacityController for StoreCapacity {
    async fn set_desired(&self, backend: BackendId, count: u32) -> Result<(), MigrationError> {
        require_container(backend)?;
        let state = self
            .store
            .set_desired(&self.route, count)
            .map_err(MigrationError::from_capacity)?;
        info!(
            route = %self.route,
            desired = state.desired,
            running = state.running,
            "container desired count set"
        );
        Ok(())
    }

    async fn get_state(&self, backend: BackendId) -> Result<CapacityState, MigrationError> {
        require_container(backend)?;
        self.store
            .get_capacity(&self.route)
            .map_err(MigrationError::from_capacity)
    }
}
