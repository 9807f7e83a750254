//! switchyard-migrate — live traffic migration between a route's function
//! and container backends.
//!
//! # Components
//!
//! - **`weight`** — `WeightController`: atomic weight-split commits on the routing rule
//! - **`capacity`** — `CapacityController`: container desired/running replica counts
//! - **`readiness`** — `ReadinessGate`: bounded polling until capacity is warm
//! - **`orchestrator`** — `MigrationOrchestrator`: the cutover state machine
//! - **`registry`** — `MigrationRegistry`: one orchestrator per route
//!
//! # Invariant
//!
//! At every committed instant exactly one backend has nonzero weight. A
//! cutover to the container backend hydrates and waits for readiness
//! before touching routing; a cutover to the function backend moves
//! routing first and drains afterwards.

pub mod capacity;
pub mod error;
pub mod orchestrator;
pub mod readiness;
pub mod registry;
pub mod weight;

#[cfg(test)]
mod testing;

pub use capacity::{CapacityController, StoreCapacity};
pub use error::MigrationError;
pub use orchestrator::{
    Branch, ContainerStep, Event, FunctionStep, MigrationOrchestrator, MigrationReport,
    MigrationRun, Phase, RejectReason, RunStatus, SideEffect, select_branch,
};
pub use readiness::{Readiness, ReadinessGate};
pub use registry::MigrationRegistry;
pub use weight::{StoreWeights, WeightController};
