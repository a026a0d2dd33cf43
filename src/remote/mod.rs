//! Remote store the operation log is reconciled against.
//!
//! The engine only needs two things from a remote: submit one mutation and
//! say whether it is reachable. Submissions must be idempotent per operation
//! ID, because delivery is at-least-once.

mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::sync::PendingOperation;

pub use sqlite::{RemoteRecord, SqliteRemote};

/// Why a remote submission did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network or server trouble; worth retrying later.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote rejected the mutation against its current state
    /// (row missing, already exists, modified incompatibly).
    #[error("remote conflict: {0}")]
    Conflict(String),

    /// No answer within the submit timeout.
    #[error("remote did not answer within {0:?}")]
    Timeout(Duration),
}

impl RemoteError {
    /// Whether a later retry could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// A store that accepts mutations from the operation log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Apply one operation. Replaying an already-applied operation ID must
    /// succeed without applying it twice.
    async fn submit(&self, operation: &PendingOperation) -> Result<(), RemoteError>;

    /// Cheap reachability check used to drive the connectivity signal.
    async fn is_reachable(&self) -> bool;
}
