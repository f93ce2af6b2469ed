//! Change detection between successive snapshots of a source.
//!
//! This crate provides:
//! - [`ChangeDetector`]: decides whether a new snapshot differs meaningfully
//!   from the previous one and produces a [`ChangeCandidate`]
//! - [`unified_diff`], [`is_significant`], [`summarize_diff`]: diff helpers
//! - [`strip_noise`]: removal of dates/years/trailers before the
//!   significance decision

pub mod diff;
pub mod noise;

pub use diff::{ChangedLines, is_significant, summarize_diff, unified_diff};
pub use noise::strip_noise;

use regwatch_shared::Snapshot;
use tracing::{debug, info, instrument};

/// A significant change ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeCandidate {
    pub source_id: String,
    pub prior_snapshot_id: String,
    pub new_snapshot_id: String,
    /// Unified diff of the original (not noise-stripped) contents.
    pub diff_text: String,
    /// Changed lines counted after noise stripping.
    pub changed_lines: ChangedLines,
}

/// Compares snapshots of the same source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `new` is a significant change over `prior`.
    ///
    /// Returns `None` when there is no successful prior snapshot, when the
    /// fingerprints match, or when the difference is only noise.
    #[instrument(skip_all, fields(source_id = %source_id))]
    pub fn detect(
        &self,
        source_id: &str,
        prior: Option<&Snapshot>,
        new: &Snapshot,
    ) -> Option<ChangeCandidate> {
        let Some(prior) = prior else {
            info!("first snapshot, baseline only");
            return None;
        };

        if !prior.is_success() || !new.is_success() {
            debug!("failed snapshot cannot be compared");
            return None;
        }

        if prior.fingerprint == new.fingerprint {
            debug!("fingerprint unchanged");
            return None;
        }

        let filtered = unified_diff(&strip_noise(&prior.content), &strip_noise(&new.content));
        let changed_lines = ChangedLines::count(&filtered);
        if !changed_lines.is_significant() {
            info!(
                changed_lines = changed_lines.total,
                content_lines = changed_lines.with_content,
                "change too minor, skipping"
            );
            return None;
        }

        let diff_text = unified_diff(&prior.content, &new.content);
        info!(
            changed_lines = changed_lines.total,
            diff_bytes = diff_text.len(),
            "significant change detected"
        );

        Some(ChangeCandidate {
            source_id: source_id.to_string(),
            prior_snapshot_id: prior.id.clone(),
            new_snapshot_id: new.id.clone(),
            diff_text,
            changed_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use regwatch_shared::SnapshotStatus;

    fn snapshot(id: &str, content: &str) -> Snapshot {
        Snapshot {
            id: id.into(),
            source_id: "src".into(),
            content: content.into(),
            fingerprint: format!("fp:{content}"),
            captured_at: Utc::now(),
            status: SnapshotStatus::Success,
            error_message: None,
        }
    }

    const OLD: &str = "Visa Core Rules\nSection 5.1 Acquirers\nSubmit merchant name\nSection 5.2 Issuers\nFooter text";
    const NEW: &str = "Visa Core Rules\nSection 5.1 Acquirers\nSubmit merchant name and recipient name\nSend recipient account number\nApplies to MCC 6051\nSection 5.2 Issuers\nFooter text";

    #[test]
    fn first_observation_is_baseline_only() {
        let detector = ChangeDetector::new();
        assert!(detector.detect("src", None, &snapshot("s1", NEW)).is_none());
    }

    #[test]
    fn equal_fingerprints_never_produce_a_change() {
        let detector = ChangeDetector::new();
        let prior = snapshot("s1", OLD);
        let mut new = snapshot("s2", NEW);
        new.fingerprint = prior.fingerprint.clone();
        assert!(detector.detect("src", Some(&prior), &new).is_none());
    }

    #[test]
    fn substantive_edit_produces_candidate_with_raw_diff() {
        let detector = ChangeDetector::new();
        let prior = snapshot("s1", OLD);
        let new = snapshot("s2", NEW);

        let candidate = detector
            .detect("src", Some(&prior), &new)
            .expect("significant change");
        assert_eq!(candidate.prior_snapshot_id, "s1");
        assert_eq!(candidate.new_snapshot_id, "s2");
        assert!(candidate.diff_text.contains("+Send recipient account number"));
        assert!(candidate.diff_text.contains("-Submit merchant name\n"));
        assert!(candidate.changed_lines.is_significant());
    }

    #[test]
    fn date_only_edits_are_noise() {
        let detector = ChangeDetector::new();
        let prior = snapshot(
            "s1",
            "Rules\nUpdated on: 2024-01-01\nPublished 01/02/2024\nCopyright Visa 2024",
        );
        let new = snapshot(
            "s2",
            "Rules\nUpdated on: 2025-06-01\nPublished 03/04/2025\nCopyright Visa 2025",
        );
        assert!(detector.detect("src", Some(&prior), &new).is_none());
    }

    #[test]
    fn persisted_diff_keeps_noise_lines() {
        let detector = ChangeDetector::new();
        let prior = snapshot("s1", &format!("Last updated: 2024-01-01\n{OLD}"));
        let new = snapshot("s2", &format!("Last updated: 2025-02-02\n{NEW}"));

        let candidate = detector
            .detect("src", Some(&prior), &new)
            .expect("significant change");
        assert!(candidate.diff_text.contains("+Last updated: 2025-02-02"));
    }

    #[test]
    fn error_snapshots_are_not_compared() {
        let detector = ChangeDetector::new();
        let prior = snapshot("s1", OLD);
        let mut failed = snapshot("s2", "");
        failed.status = SnapshotStatus::Error;
        assert!(detector.detect("src", Some(&prior), &failed).is_none());
    }
}
