//! File exports of recorded findings: a flat CSV sheet, a JSON dashboard
//! payload, and a standalone HTML report.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use regwatch_shared::{FindingRecord, Impact, RegwatchError, Result};

const CSV_HEADER: [&str; 13] = [
    "title",
    "impact_level",
    "deadline",
    "days_remaining",
    "summary",
    "mccs",
    "regions",
    "transaction_types",
    "technical_requirements",
    "relevance_score",
    "source_name",
    "url",
    "detected_at",
];

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// Whole days from `today` until `deadline`; negative once it has passed.
pub fn days_remaining(deadline: NaiveDate, today: NaiveDate) -> i64 {
    (deadline - today).num_days()
}

/// Urgency bucket of a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    Overdue,
    /// Under 30 days left.
    Urgent,
    /// Under 90 days left.
    Upcoming,
    Later,
}

impl DeadlineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Overdue => "Overdue",
            Self::Urgent => "Due within 30 days",
            Self::Upcoming => "Due within 90 days",
            Self::Later => "Later",
        }
    }

    pub fn classify(deadline: NaiveDate, today: NaiveDate) -> Self {
        match days_remaining(deadline, today) {
            d if d < 0 => Self::Overdue,
            d if d < 30 => Self::Urgent,
            d if d < 90 => Self::Upcoming,
            _ => Self::Later,
        }
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Write `records` as CSV, one row per finding. An empty set yields a
/// header-only file.
pub fn write_csv(records: &[FindingRecord], path: &Path, today: NaiveDate) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_err(path, e))?;
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| csv_err(path, e))?;

    for record in records {
        let f = &record.finding;
        let deadline = f.deadline.map(|d| d.to_string()).unwrap_or_default();
        let days = f
            .deadline
            .map(|d| days_remaining(d, today).to_string())
            .unwrap_or_default();

        let impact = f.impact.as_str().to_uppercase();
        let categories = f.categories.join(", ");
        let regions = f.regions.join(", ");
        let transaction_types = f.transaction_types.join(", ");
        let requirements = f.technical_requirements.join(" | ");
        let score = f.relevance_score.to_string();
        let detected_at = f.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);

        let row: [&str; 13] = [
            &f.title,
            &impact,
            &deadline,
            &days,
            &f.summary,
            &categories,
            &regions,
            &transaction_types,
            &requirements,
            &score,
            &record.source_name,
            &record.source_url,
            &detected_at,
        ];
        writer
            .write_record(row)
            .map_err(|e| csv_err(path, e))?;
    }

    writer.flush().map_err(|e| RegwatchError::io(path, e))?;
    info!(path = %path.display(), rows = records.len(), "exported CSV");
    Ok(())
}

fn csv_err(path: &Path, e: csv::Error) -> RegwatchError {
    RegwatchError::Storage(format!("failed to write {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Dashboard<'a> {
    last_updated: String,
    total_items: usize,
    items: &'a [FindingRecord],
}

/// Write the dashboard payload `{last_updated, total_items, items}`.
pub fn write_json(records: &[FindingRecord], path: &Path, now: DateTime<Utc>) -> Result<()> {
    ensure_parent(path)?;
    let payload = Dashboard {
        last_updated: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        total_items: records.len(),
        items: records,
    };
    let body = serde_json::to_string_pretty(&payload)
        .map_err(|e| RegwatchError::Storage(format!("failed to encode dashboard: {e}")))?;
    fs::write(path, body).map_err(|e| RegwatchError::io(path, e))?;

    info!(path = %path.display(), items = records.len(), "exported dashboard JSON");
    Ok(())
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

const HTML_STYLE: &str = "\
body{font-family:system-ui,sans-serif;color:#333;max-width:1100px;margin:0 auto;padding:20px;background:#f5f5f5}\
header{background:#4b3f8f;color:#fff;padding:24px;border-radius:8px;margin-bottom:24px}\
.cards{display:flex;gap:16px;margin-bottom:24px}\
.card{flex:1;background:#fff;padding:16px;border-radius:8px;text-align:center}\
.card b{display:block;font-size:2em}\
.item{background:#fff;padding:20px;margin-bottom:16px;border-radius:8px;border-left:5px solid #ccc}\
.item.high{border-left-color:#e74c3c}.item.medium{border-left-color:#f39c12}.item.low{border-left-color:#27ae60}\
.high{color:#e74c3c}.medium{color:#f39c12}.low{color:#27ae60}\
.meta{background:#f8f9fa;padding:10px;border-radius:5px;font-size:.9em}\
.score{display:inline-block;padding:4px 10px;background:#4b3f8f;color:#fff;border-radius:5px}";

/// Escape text for HTML element content and quoted attributes.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render the standalone report: impact totals, then findings grouped by
/// deadline urgency, with undated findings last.
pub fn render_html(records: &[FindingRecord], today: NaiveDate, now: DateTime<Utc>) -> String {
    let count = |impact| records.iter().filter(|r| r.finding.impact == impact).count();
    let generated = now.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>Compliance Findings Report</title>\n<style>{HTML_STYLE}</style>\n</head>\n<body>\n\
         <header><h1>Compliance Findings Report</h1><div>Generated: {generated}</div></header>\n\
         <div class=\"cards\">\
         <div class=\"card\">Total<b>{}</b></div>\
         <div class=\"card\">High<b class=\"high\">{}</b></div>\
         <div class=\"card\">Medium<b class=\"medium\">{}</b></div>\
         <div class=\"card\">Low<b class=\"low\">{}</b></div>\
         </div>\n",
        records.len(),
        count(Impact::High),
        count(Impact::Medium),
        count(Impact::Low),
    );

    if records.is_empty() {
        html.push_str("<p>No findings recorded.</p>\n");
    }

    let groups = [
        Some(DeadlineStatus::Overdue),
        Some(DeadlineStatus::Urgent),
        Some(DeadlineStatus::Upcoming),
        Some(DeadlineStatus::Later),
        None,
    ];
    for group in groups {
        let members: Vec<&FindingRecord> = records
            .iter()
            .filter(|r| r.finding.deadline.map(|d| DeadlineStatus::classify(d, today)) == group)
            .collect();
        if members.is_empty() {
            continue;
        }
        let heading = group.map_or("No deadline", |g| g.label());
        let _ = writeln!(html, "<section>\n<h2>{heading} ({})</h2>", members.len());
        for record in members {
            render_item(&mut html, record, today);
        }
        html.push_str("</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_item(html: &mut String, record: &FindingRecord, today: NaiveDate) {
    let f = &record.finding;
    let impact = f.impact.as_str();
    let _ = write!(
        html,
        "<article class=\"item {impact}\">\n<h3>{}</h3>\n<div class=\"meta\">\
         <span class=\"{impact}\">{}</span>",
        escape(&f.title),
        impact.to_uppercase(),
    );
    if let Some(deadline) = f.deadline {
        let _ = write!(
            html,
            " | Deadline: {deadline} ({} days)",
            days_remaining(deadline, today)
        );
    }
    for (label, values) in [
        ("Categories", &f.categories),
        ("Regions", &f.regions),
        ("Transaction types", &f.transaction_types),
    ] {
        if !values.is_empty() {
            let _ = write!(html, " | {label}: {}", escape(&values.join(", ")));
        }
    }
    html.push_str("</div>\n");

    if !f.summary.is_empty() {
        let _ = writeln!(html, "<p>{}</p>", escape(&f.summary));
    }
    if !f.technical_requirements.is_empty() {
        html.push_str("<h4>Technical requirements</h4>\n<ul>\n");
        for req in &f.technical_requirements {
            let _ = writeln!(html, "<li>{}</li>", escape(req));
        }
        html.push_str("</ul>\n");
    }
    let _ = writeln!(
        html,
        "<span class=\"score\">Relevance {}/10</span> \
         <a href=\"{}\">{}</a>\n</article>",
        f.relevance_score,
        escape(&record.source_url),
        escape(&record.source_name),
    );
}

/// Write the HTML report to `path`.
pub fn write_html(
    records: &[FindingRecord],
    path: &Path,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, render_html(records, today, now)).map_err(|e| RegwatchError::io(path, e))?;
    info!(path = %path.display(), items = records.len(), "exported HTML report");
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| RegwatchError::io(dir, e))
        }
        _ => Ok(()),
    }
}
