pub mod actors;
pub mod aggregator;
pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod prober;
pub mod queue;
pub mod schema;
pub mod storage;
pub mod util;
pub mod writer;

pub use error::{NetworkError, NetworkErrorKind, PublishError, QueryError, QueueError, SchemaError};
pub use schema::{FailureEvent, ProbeRecord, ProbeTarget, SslInfo};
pub use storage::PersistenceError;
