//! switchyard-state — embedded routing and capacity store.
//!
//! Backed by [redb](https://docs.rs/redb), this crate plays the part of
//! the routing layer and the capacity backend for a single control plane:
//! one table holds every route's rule (its two pools and the committed
//! weight split), another holds the container capacity record per route.
//!
//! # Atomicity
//!
//! A weight commit reads the rule, validates the pool handles, and writes
//! the new split inside one redb write transaction. Readers see either the
//! old split or the new one, never a half-applied pair. redb serializes
//! write transactions, so concurrent commits for the same route are
//! applied one after another.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
