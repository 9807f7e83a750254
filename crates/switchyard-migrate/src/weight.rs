//! Weight controller — reads and commits a route's weight split.
//!
//! A commit replaces both pool weights in one step. Re-applying the split
//! that is already committed is a successful no-op.

use async_trait::async_trait;
use switchyard_core::WeightSplit;
use switchyard_state::StateStore;
use tracing::{debug, info};

use crate::error::MigrationError;

/// Access to the routing layer's weighted rule for one or more routes.
#[async_trait]
pub trait WeightController: Send + Sync {
    /// Atomically apply `split` to the route.
    ///
    /// Fails with `RoutingUnavailable` when the routing layer can't be
    /// reached and `InvalidPool` when a pool handle is stale.
    async fn set_weights(&self, route: &str, split: &WeightSplit) -> Result<(), MigrationError>;

    /// Read the committed split of the route.
    async fn get_weights(&self, route: &str) -> Result<WeightSplit, MigrationError>;
}

/// Weight controller backed by the embedded state store.
#[derive(Clone)]
pub struct StoreWeights {
    store: StateStore,
}

impl StoreWeights {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WeightController for StoreWeights {
    async fn set_weights(&self, route: &str, split: &WeightSplit) -> Result<(), MigrationError> {
        let changed = self
            .store
            .commit_split(route, split)
            .map_err(MigrationError::from_routing)?;
        if changed {
            info!(
                %route,
                function = split.function.weight,
                container = split.container.weight,
                "weights committed"
            );
        } else {
            debug!(%route, "weights already committed");
        }
        Ok(())
    }

    async fn get_weights(&self, route: &str) -> Result<WeightSplit, MigrationError> {
        self.store
            .get_split(route)
            .map_err(MigrationError::from_routing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{BackendId, RoutePools, RouteSpec};

    fn provisioned_store() -> (StateStore, RoutePools) {
        let store = StateStore::open_in_memory().unwrap();
        let rule = store
            .provision_route(&RouteSpec {
                id: "route1".to_string(),
                path: "/route1".to_string(),
                priority: 1,
                function_pool: "tg-fn".to_string(),
                container_pool: "tg-ctr".to_string(),
                warm_capacity: None,
            })
            .unwrap();
        (store, rule.pools)
    }

    #[tokio::test]
    async fn set_then_get_returns_committed_split() {
        let (store, pools) = provisioned_store();
        let weights = StoreWeights::new(store);

        let split = pools.exclusive(BackendId::Container);
        weights.set_weights("route1", &split).await.unwrap();
        assert_eq!(weights.get_weights("route1").await.unwrap(), split);

        // Re-applying is a no-op success.
        weights.set_weights("route1", &split).await.unwrap();
    }

    #[tokio::test]
    async fn stale_pool_is_invalid_pool() {
        let (store, _) = provisioned_store();
        let weights = StoreWeights::new(store);

        let stale = RoutePools::new("tg-old", "tg-ctr").exclusive(BackendId::Container);
        let err = weights.set_weights("route1", &stale).await.unwrap_err();
        assert!(matches!(err, MigrationError::InvalidPool(_)));
    }
}
