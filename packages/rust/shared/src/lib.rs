//! Shared types, error model, and configuration for Regwatch.
//!
//! This crate is the foundation depended on by all other Regwatch crates.
//! It provides:
//! - [`RegwatchError`]: the unified error type
//! - Domain types ([`Source`], [`Snapshot`], [`Change`], [`Finding`], [`ConsumerProfile`])
//! - Configuration ([`AppConfig`], [`ScrapingConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AlertsConfig, AppConfig, IntelligenceConfig, ScrapingConfig, SourceEntry, SystemConfig,
    config_dir, config_file_path, init_config, init_config_at, load_config, load_config_from,
    validate_api_key, validate_profile, validate_sources,
};
pub use error::{RegwatchError, Result};
pub use types::{
    Change, ConsumerProfile, ExtractedFinding, Finding, FindingRecord, Impact, ScanStats, Snapshot,
    SnapshotStatus, Source,
};
