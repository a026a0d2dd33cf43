//! Configuration management for clinic-sync.
//!
//! This module handles loading configuration from `~/.clinic-sync/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{Config, GeneralConfig, RemoteConfig, SyncConfig};
