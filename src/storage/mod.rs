//! Storage layer for clinic-sync.
//!
//! SQLite-based persistence for the operation log and sync metadata.

mod database;
mod migrations;

pub use database::Database;
