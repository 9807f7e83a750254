//! StateStore — redb-backed routing and capacity persistence.
//!
//! Provides typed operations over route rules and container capacity
//! records. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use switchyard_core::{CapacityState, RouteSpec, WeightSplit, epoch_secs};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ROUTES).map_err(map_err!(Table))?;
        txn.open_table(CAPACITY).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Provisioning ───────────────────────────────────────────────

    /// Register a route and its container service if they don't exist yet.
    ///
    /// A new route starts with all traffic on the function backend and a
    /// container desired count of zero. Re-provisioning an existing route
    /// keeps its committed split and capacity; pool handles are fixed for
    /// the route's lifetime, so a spec naming different pools is a
    /// conflict.
    pub fn provision_route(&self, spec: &RouteSpec) -> StateResult<RouteRule> {
        let now = epoch_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let rule = {
            let mut routes = txn.open_table(ROUTES).map_err(map_err!(Table))?;
            let existing = routes
                .get(spec.id.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec());

            match existing {
                Some(bytes) => {
                    let rule: RouteRule =
                        serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                    if rule.pools != spec.pools() {
                        return Err(StateError::Conflict(format!(
                            "route {} is already bound to different pools",
                            spec.id
                        )));
                    }
                    rule
                }
                None => {
                    let rule = RouteRule::provisioned(spec, now);
                    let value = serde_json::to_vec(&rule).map_err(map_err!(Serialize))?;
                    routes
                        .insert(spec.id.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    info!(route = %spec.id, path = %spec.path, "route provisioned");
                    rule
                }
            }
        };
        {
            let mut capacity = txn.open_table(CAPACITY).map_err(map_err!(Table))?;
            let present = capacity
                .get(spec.id.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if !present {
                let record = CapacityRecord {
                    route: spec.id.clone(),
                    state: CapacityState::default(),
                    updated_at: now,
                };
                let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                capacity
                    .insert(spec.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(rule)
    }

    // ── Routes ─────────────────────────────────────────────────────

    /// Get a route rule by id.
    pub fn get_route(&self, route: &str) -> StateResult<Option<RouteRule>> {
        self.get(ROUTES, route)
    }

    /// List all route rules.
    pub fn list_routes(&self) -> StateResult<Vec<RouteRule>> {
        self.list(ROUTES)
    }

    /// Read the committed split of a route.
    pub fn get_split(&self, route: &str) -> StateResult<WeightSplit> {
        self.get_route(route)?
            .map(|rule| rule.split)
            .ok_or_else(|| StateError::NotFound(format!("route {route}")))
    }

    /// Atomically replace the committed split of a route.
    ///
    /// Both pool handles in `split` must match the route's bound pools.
    /// Returns `true` if the split changed, `false` if it was already
    /// committed (a no-op).
    pub fn commit_split(&self, route: &str, split: &WeightSplit) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let changed = {
            let mut routes = txn.open_table(ROUTES).map_err(map_err!(Table))?;
            let bytes = routes
                .get(route)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(format!("route {route}")))?;
            let mut rule: RouteRule =
                serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;

            for backend in switchyard_core::BackendId::ALL {
                let bound = &rule.pools.get(backend).handle;
                let given = &split.entry(backend).pool;
                if bound != given {
                    return Err(StateError::StalePool(format!(
                        "{given} is not the {backend} pool of route {route}"
                    )));
                }
            }

            if rule.split == *split {
                false
            } else {
                rule.split = split.clone();
                rule.updated_at = epoch_secs();
                let value = serde_json::to_vec(&rule).map_err(map_err!(Serialize))?;
                routes
                    .insert(route, value.as_slice())
                    .map_err(map_err!(Write))?;
                true
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%route, changed, "weight split committed");
        Ok(changed)
    }

    // ── Capacity ───────────────────────────────────────────────────

    /// Get the container capacity of a route.
    pub fn get_capacity(&self, route: &str) -> StateResult<CapacityState> {
        self.get::<CapacityRecord>(CAPACITY, route)?
            .map(|record| record.state)
            .ok_or_else(|| StateError::NotFound(format!("capacity for {route}")))
    }

    /// List all capacity records.
    pub fn list_capacity(&self) -> StateResult<Vec<CapacityRecord>> {
        self.list(CAPACITY)
    }

    /// Record a new desired count. Running is left to converge on its own.
    pub fn set_desired(&self, route: &str, desired: u32) -> StateResult<CapacityState> {
        self.update_capacity(route, |state| state.desired = desired)
    }

    /// Record an observed running count (written by the scaler).
    pub fn set_running(&self, route: &str, running: u32) -> StateResult<CapacityState> {
        self.update_capacity(route, |state| state.running = running)
    }

    fn update_capacity(
        &self,
        route: &str,
        apply: impl FnOnce(&mut CapacityState),
    ) -> StateResult<CapacityState> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let state = {
            let mut table = txn.open_table(CAPACITY).map_err(map_err!(Table))?;
            let bytes = table
                .get(route)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(format!("capacity for {route}")))?;
            let mut record: CapacityRecord =
                serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
            apply(&mut record.state);
            record.updated_at = epoch_secs();
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(route, value.as_slice())
                .map_err(map_err!(Write))?;
            record.state
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(state)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }
}
