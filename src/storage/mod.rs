//! Storage backends for probe records
//!
//! ## Design
//!
//! - **Trait-based**: `MetricsStore` allows swapping implementations
//! - **Append-only**: records are inserted once and never updated
//! - **Key-range reads**: queries target one partition and a time range,
//!   paginated by cursor, so read cost follows the query window rather than
//!   the total amount of stored data
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: No persistence, for tests or alert-only deployments

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, MetricsStore, PageCursor, RangeQuery, RecordPage};
pub use error::{PersistenceError, StorageResult};
pub use memory::MemoryStore;
