//! Relevance scoring of extracted findings against a consumer profile.
//!
//! Additive heuristic on a base of 5:
//!
//! | Term | Bonus |
//! |------|-------|
//! | shared category code (exact, case-sensitive) | +3 |
//! | shared region (case-insensitive), or a universal region on the finding | +2 |
//! | at least 3 shared keywords (case-insensitive) | +1 |
//! | high impact | +1 |
//!
//! The sum is clamped to `1..=10`.

use std::collections::HashSet;

use regwatch_shared::{ConsumerProfile, ExtractedFinding, Impact};

pub const BASE_SCORE: u8 = 5;
pub const CATEGORY_BONUS: u8 = 3;
pub const REGION_BONUS: u8 = 2;
pub const KEYWORD_BONUS: u8 = 1;
pub const HIGH_IMPACT_BONUS: u8 = 1;

/// Shared keywords needed for the keyword bonus.
pub const MIN_SHARED_KEYWORDS: usize = 3;

/// Region tokens that apply to every consumer (compared uppercased).
const UNIVERSAL_REGIONS: &[&str] = &["GLOBAL", "WORLDWIDE"];

/// Which scoring terms fired for one finding/profile pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub category_match: bool,
    pub region_match: bool,
    pub shared_keywords: usize,
    pub high_impact: bool,
}

impl ScoreBreakdown {
    pub fn keyword_match(&self) -> bool {
        self.shared_keywords >= MIN_SHARED_KEYWORDS
    }

    /// Final clamped score.
    pub fn score(&self) -> u8 {
        let mut total = BASE_SCORE;
        if self.category_match {
            total += CATEGORY_BONUS;
        }
        if self.region_match {
            total += REGION_BONUS;
        }
        if self.keyword_match() {
            total += KEYWORD_BONUS;
        }
        if self.high_impact {
            total += HIGH_IMPACT_BONUS;
        }
        total.clamp(1, 10)
    }
}

/// Evaluate every scoring term.
pub fn breakdown(finding: &ExtractedFinding, profile: &ConsumerProfile) -> ScoreBreakdown {
    let finding_categories = tokens(&finding.categories, false);
    let profile_categories = tokens(&profile.categories, false);

    let finding_regions = tokens(&finding.regions, true);
    let profile_regions = tokens(&profile.regions, true);
    let universal = UNIVERSAL_REGIONS
        .iter()
        .any(|r| finding_regions.contains(*r));

    let shared_keywords = tokens(&finding.keywords, true)
        .intersection(&tokens(&profile.keywords, true))
        .count();

    ScoreBreakdown {
        category_match: !finding_categories.is_disjoint(&profile_categories),
        region_match: universal || !finding_regions.is_disjoint(&profile_regions),
        shared_keywords,
        high_impact: finding.impact == Impact::High,
    }
}

/// Relevance of `finding` to `profile`, in `1..=10`.
pub fn score(finding: &ExtractedFinding, profile: &ConsumerProfile) -> u8 {
    breakdown(finding, profile).score()
}

/// Trimmed, non-empty tokens; uppercased when `fold_case` is set.
fn tokens(values: &[String], fold_case: bool) -> HashSet<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| {
            if fold_case {
                v.to_uppercase()
            } else {
                v.to_string()
            }
        })
        .collect()
}
