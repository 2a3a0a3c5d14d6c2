//! Actor-based scheduling
//!
//! Each actor runs as an independent async task and is controlled through a
//! cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ProberActor (target 1) ─┐
//!  ProberActor (target N) ─┼─▶ MetricsStore      ◀── RetentionActor
//!                          └─▶ FailureQueue ──▶ DispatcherActor ──▶ Notifier fan-out
//! ```
//!
//! ## Actor Types
//!
//! - **ProberActor**: probes one target per interval
//! - **DispatcherActor**: polls the failure queue and publishes alerts
//! - **RetentionActor**: deletes expired probe records daily
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for commands that return a result
//! 3. **Shared clients**: store, queue and notifier are injected as `Arc<dyn Trait>`

pub mod dispatcher;
pub mod messages;
pub mod prober;
pub mod retention;

pub use dispatcher::DispatcherHandle;
pub use prober::ProberHandle;
pub use retention::RetentionHandle;
