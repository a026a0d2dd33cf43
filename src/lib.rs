//! clinic-sync - local-first mutation synchronization
//!
//! This crate records local mutations of clinic records in a durable
//! operation log and reconciles them against a remote store when
//! connectivity allows.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod remote;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::SyncError;
pub use sync::{SyncEngine, SyncStatus, SyncSummary};
