//! Boundary to the external semantic-extraction service.
//!
//! An [`Extractor`] turns one change's diff into an [`ExtractedFinding`]. The
//! service's reply is free text that should hold a JSON object; parsing is
//! deliberately tolerant of Markdown fences but strict about the shape, so a
//! bad reply becomes an `Extraction` error instead of a bogus finding.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use regwatch_shared::{ExtractedFinding, Impact, RegwatchError, Result};
use regwatch_storage::PendingChange;

// ---------------------------------------------------------------------------
// Request / trait
// ---------------------------------------------------------------------------

/// Everything the extraction service is told about one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub change_id: String,
    pub source_name: String,
    pub source_url: String,
    pub diff_text: String,
}

impl From<&PendingChange> for ExtractionRequest {
    fn from(pending: &PendingChange) -> Self {
        Self {
            change_id: pending.change.id.clone(),
            source_name: pending.source_name.clone(),
            source_url: pending.source_url.clone(),
            diff_text: pending.change.diff_text.clone(),
        }
    }
}

/// A semantic-extraction service.
pub trait Extractor: Send + Sync {
    /// Extract structured fields from one change.
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl Future<Output = Result<ExtractedFinding>> + Send;
}

/// Run one request through `extractor`, bounded by `timeout`.
///
/// A timeout is reported as an `Extraction` error for that change.
#[instrument(skip_all, fields(change_id = %request.change_id))]
pub async fn extract_with_timeout<E: Extractor>(
    extractor: &E,
    request: &ExtractionRequest,
    timeout: Duration,
) -> Result<ExtractedFinding> {
    debug!(source = %request.source_name, "extracting change");
    let result = match tokio::time::timeout(timeout, extractor.extract(request)).await {
        Ok(result) => result,
        Err(_) => Err(RegwatchError::Extraction(format!(
            "change {} timed out after {}s",
            request.change_id,
            timeout.as_secs_f64()
        ))),
    };

    if let Err(e) = &result {
        warn!(error = %e, "extraction failed");
    }
    result
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Reply shape. Lists may hold strings or bare numbers (category codes).
///
/// `impact_level` and `mccs` are accepted as alternate spellings; when a reply
/// carries both, `impact` and `categories` win.
#[derive(Debug, Deserialize)]
struct WireFinding {
    title: Option<Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    impact_level: Option<String>,
    #[serde(default)]
    categories: Option<Vec<Value>>,
    #[serde(default)]
    mccs: Option<Vec<Value>>,
    #[serde(default)]
    regions: Option<Vec<Value>>,
    #[serde(default)]
    transaction_types: Option<Vec<Value>>,
    #[serde(default)]
    technical_requirements: Option<Vec<Value>>,
    #[serde(default)]
    keywords: Option<Vec<Value>>,
}

/// Parse an extraction reply into structured fields.
///
/// Accepts the JSON object bare or wrapped in a Markdown code fence (with or
/// without a `json` tag). Requires a non-empty string `title`. Missing lists
/// are empty, a missing impact is `medium`, and an unreadable deadline is
/// dropped.
pub fn parse_extraction(text: &str) -> Result<ExtractedFinding> {
    let body = strip_fences(text);
    if body.is_empty() {
        return Err(RegwatchError::Extraction("empty reply".into()));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| RegwatchError::Extraction(format!("reply is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(RegwatchError::Extraction(
            "reply is not a JSON object".into(),
        ));
    }

    let wire: WireFinding = serde_json::from_value(value)
        .map_err(|e| RegwatchError::Extraction(format!("unexpected reply shape: {e}")))?;

    let title = match wire.title {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => {
            return Err(RegwatchError::Extraction("reply has an empty title".into()));
        }
        Some(_) => {
            return Err(RegwatchError::Extraction("reply title is not a string".into()));
        }
        None => return Err(RegwatchError::Extraction("reply has no title".into())),
    };

    let impact = match wire.impact.or(wire.impact_level).as_deref().map(str::trim) {
        None | Some("") => Impact::default(),
        Some(raw) => raw
            .parse::<Impact>()
            .map_err(|_| RegwatchError::Extraction(format!("unknown impact level '{raw}'")))?,
    };

    Ok(ExtractedFinding {
        title,
        summary: wire.summary.unwrap_or_default().trim().to_string(),
        deadline: wire.deadline.as_deref().and_then(parse_deadline),
        impact,
        categories: string_list(wire.categories.or(wire.mccs)),
        regions: string_list(wire.regions),
        transaction_types: string_list(wire.transaction_types),
        technical_requirements: string_list(wire.technical_requirements),
        keywords: string_list(wire.keywords),
    })
}

/// Strip surrounding whitespace, a Markdown code fence, and a leading `json` tag.
fn strip_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        // Drop the opening fence line (which may carry a language tag)
        body = match rest.find('\n') {
            Some(i) => &rest[i + 1..],
            None => rest,
        };
        body = body.trim_end();
        if let Some(inner) = body.strip_suffix("```") {
            body = inner;
        }
        body = body.trim();
    }

    if let Some(rest) = body.strip_prefix("json") {
        body = rest.trim_start();
    }

    body
}

fn parse_deadline(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }

    // Accept a full timestamp by reading its date part.
    let date_part = raw.get(..10).unwrap_or(raw);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(deadline = raw, error = %e, "ignoring unparseable deadline");
            None
        }
    }
}

/// Order-preserving list of trimmed, non-empty strings. Numbers are rendered
/// as text; other values are skipped.
fn string_list(values: Option<Vec<Value>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
