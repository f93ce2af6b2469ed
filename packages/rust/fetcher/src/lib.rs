//! Document retrieval for monitored sources.
//!
//! This crate provides:
//! - [`Fetcher`]: retrying HTTP client that turns a [`Source`](regwatch_shared::Source)
//!   into a [`FetchOutcome`]
//! - [`RateLimiter`]: the shared inter-request watermark injected into a fetcher
//! - [`extract_text`] / [`fingerprint`]: HTML to normalized text, and its hash

pub mod client;
pub mod extract;
pub mod limiter;

pub use client::{FetchOutcome, Fetcher};
pub use extract::{extract_text, fingerprint};
pub use limiter::RateLimiter;
