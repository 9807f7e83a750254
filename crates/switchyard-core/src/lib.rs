//! switchyard-core — shared domain types and configuration.
//!
//! A migratable route sits behind one weighted routing rule with exactly
//! two target pools: one for the always-warm function backend and one for
//! the container backend. Everything in this crate is plain data; the
//! controllers that act on it live in `switchyard-migrate`.

pub mod config;
pub mod types;

pub use config::{ConfigError, MigrationSettings, RouteSpec, SwitchyardConfig, parse_duration};
pub use types::*;
