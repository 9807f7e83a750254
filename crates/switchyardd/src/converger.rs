//! Capacity converger, a stand-in for the external scaler.
//!
//! On every tick each route's container `running` count moves one
//! replica toward `desired`, the way a container service starts or stops
//! tasks over time. The orchestrator never calls this; it only observes
//! the result through capacity reads.

use std::time::Duration;

use switchyard_state::{StateResult, StateStore};
use tokio::sync::watch;
use tracing::{debug, info};

pub struct Converger {
    store: StateStore,
}

impl Converger {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Step every route one replica toward its desired count.
    ///
    /// Returns the number of routes whose running count changed.
    pub fn converge_once(&self) -> StateResult<usize> {
        let mut changed = 0;
        for record in self.store.list_capacity()? {
            let state = record.state;
            let next = match state.running.cmp(&state.desired) {
                std::cmp::Ordering::Less => state.running + 1,
                std::cmp::Ordering::Greater => state.running - 1,
                std::cmp::Ordering::Equal => continue,
            };
            self.store.set_running(&record.route, next)?;
            debug!(
                route = %record.route,
                desired = state.desired,
                running = next,
                "container replicas converging"
            );
            changed += 1;
        }
        Ok(changed)
    }

    /// Run the converger loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "capacity converger started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.converge_once() {
                        tracing::error!(error = %e, "capacity convergence failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("capacity converger shutting down");
                    break;
                }
            }
        }
    }
}
