//! Scan orchestration and domain logic for Regwatch.
//!
//! This crate ties fetching, change detection, extraction and scoring into a
//! single scan cycle ([`run_scan`]) and exposes the reporting exports and demo
//! seeding.

pub mod claude;
pub mod demo;
pub mod export;
pub mod extraction;
pub mod pipeline;
pub mod scorer;

pub use claude::ClaudeExtractor;
pub use extraction::{ExtractionRequest, Extractor, extract_with_timeout, parse_extraction};
pub use pipeline::{
    FailureStage, ProgressReporter, ScanOptions, ScanPhase, ScanReport, Scanner, SilentProgress,
    SourceError, run_scan,
};
