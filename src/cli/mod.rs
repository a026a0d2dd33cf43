//! Command-line interface for clinic-sync.

pub mod args;
pub mod commands;
