//! Noise stripping applied before the significance decision.
//!
//! Each pattern is removed from every line in order (case-insensitive), then
//! lines left blank are dropped. The result is only used to decide whether a
//! change matters; persisted diffs are always built from the original text.

use std::sync::LazyLock;

use regex::Regex;

static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Copyright notices up to the last year on the line
        r"(?i)copyright.*\d{4}",
        // Update trailers, to end of line
        r"(?i)last updated:.*",
        r"(?i)updated on:.*",
        // Slash- or dash-separated dates (1/2/2025, 01-02-25)
        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
        // ISO dates
        r"\b\d{4}-\d{2}-\d{2}\b",
        // Bare years, 19xx/20xx only so four-digit category codes like 6051 survive
        r"\b(?:19|20)\d{2}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid noise pattern"))
    .collect()
});

/// Remove dates, years, and update/copyright trailers from `text`.
pub fn strip_noise(text: &str) -> String {
    text.lines()
        .filter_map(|line| {
            let mut cleaned = line.to_string();
            for pattern in NOISE_PATTERNS.iter() {
                if pattern.is_match(&cleaned) {
                    cleaned = pattern.replace_all(&cleaned, "").into_owned();
                }
            }
            let cleaned = cleaned.trim();
            (!cleaned.is_empty()).then(|| cleaned.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
