//! Offline-first synchronization.
//!
//! Local mutations are appended to a durable operation log and drained into
//! a remote store whenever connectivity allows.
//!
//! Features:
//! - Durable, ordered operation log that survives restarts
//! - Single-flight drain cycles with per-entity causal ordering
//! - Bounded retries with a dead-letter state for conflicts and exhausted operations
//! - Status snapshots pushed to observers on every change

pub mod connectivity;
pub mod engine;
pub mod log;
pub mod operation;
pub mod status;

pub use connectivity::{probe_loop, ConnectivitySignal};
pub use engine::{EngineConfig, SkipReason, SyncEngine, SyncSummary};
pub use log::{BatchEntry, FailureOutcome, LogStats, OperationLog};
pub use operation::{
    CorruptEntry, DeadLetter, DeadLetterReason, EntityRef, NewOperation, OperationKind,
    PendingOperation,
};
pub use status::{StatusPublisher, SubscriptionId, SyncStatus};
