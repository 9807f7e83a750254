//! redb table definitions for the Switchyard state store.
//!
//! Both tables use `&str` route-id keys and `&[u8]` JSON values.

use redb::TableDefinition;

/// Route rules (pools + committed weight split) keyed by `{route_id}`.
pub const ROUTES: TableDefinition<&str, &[u8]> = TableDefinition::new("routes");

/// Container capacity records keyed by `{route_id}`.
pub const CAPACITY: TableDefinition<&str, &[u8]> = TableDefinition::new("capacity");
