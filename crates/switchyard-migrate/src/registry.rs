//! Migration registry — one orchestrator per provisioned route.

use std::collections::BTreeMap;
use std::sync::Arc;

use switchyard_core::{MigrationRequest, MigrationSettings, RouteId, RouteSpec};
use switchyard_state::{StateResult, StateStore};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::capacity::StoreCapacity;
use crate::orchestrator::{MigrationOrchestrator, MigrationReport, RejectReason};
use crate::weight::StoreWeights;

/// Routes each migration request to its route's orchestrator.
///
/// Orchestrators share nothing, so runs on different routes proceed
/// concurrently.
#[derive(Default)]
pub struct MigrationRegistry {
    orchestrators: BTreeMap<RouteId, Arc<MigrationOrchestrator>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision every route in the store and build store-backed
    /// orchestrators for them.
    pub fn from_store(
        store: &StateStore,
        routes: &[RouteSpec],
        settings: &MigrationSettings,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> StateResult<Self> {
        let weights = Arc::new(StoreWeights::new(store.clone()));
        let mut registry = Self::new();
        for spec in routes {
            let rule = store.provision_route(spec)?;
            let capacity = Arc::new(StoreCapacity::new(store.clone(), &spec.id));
            let mut orch = MigrationOrchestrator::new(
                &spec.id,
                rule.pools,
                weights.clone(),
                capacity,
                settings,
            );
            if let Some(n) = spec.warm_capacity {
                orch = orch.with_warm_capacity(n);
            }
            if let Some(rx) = &shutdown {
                orch = orch.with_shutdown(rx.clone());
            }
            registry.register(orch);
        }
        info!(routes = registry.len(), "migration registry ready");
        Ok(registry)
    }

    pub fn register(&mut self, orchestrator: MigrationOrchestrator) {
        self.orchestrators
            .insert(orchestrator.route().to_string(), Arc::new(orchestrator));
    }

    pub fn get(&self, route: &str) -> Option<Arc<MigrationOrchestrator>> {
        self.orchestrators.get(route).cloned()
    }

    pub fn routes(&self) -> Vec<RouteId> {
        self.orchestrators.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.orchestrators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orchestrators.is_empty()
    }

    /// Run a migration on `route`. Unknown routes are rejected.
    pub async fn migrate(&self, route: &str, request: &MigrationRequest) -> MigrationReport {
        match self.get(route) {
            Some(orch) => orch.migrate(request).await,
            None => {
                warn!(%route, "migration requested for unknown route");
                MigrationReport::rejected(route, request.backend().ok(), RejectReason::UnknownRoute)
            }
        }
    }
}
