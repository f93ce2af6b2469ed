//! Terminal rendering of scan reports, findings, and sources.

use chrono::NaiveDate;
use console::{Style, style};

use regwatch_core::ScanReport;
use regwatch_core::export::{DeadlineStatus, days_remaining};
use regwatch_core::pipeline::FailureStage;
use regwatch_shared::{FindingRecord, Impact, Source};

/// Technical requirements shown per finding before truncating.
const MAX_REQUIREMENTS: usize = 5;

const RULE_WIDTH: usize = 80;

fn impact_style(impact: Impact) -> Style {
    match impact {
        Impact::High => Style::new().red().bold(),
        Impact::Medium => Style::new().yellow(),
        Impact::Low => Style::new().green(),
    }
}

fn rule(s: &Style) -> String {
    s.apply_to("=".repeat(RULE_WIDTH)).to_string()
}

pub(crate) fn print_scan_report(report: &ScanReport) {
    let stats = &report.stats;
    println!();
    println!("  Scan {}", report.phase);
    println!("  Sources scanned:  {}", stats.sources_scanned);
    println!("  Snapshots saved:  {}", stats.snapshots_saved);
    println!("  Changes detected: {}", stats.changes_detected);
    println!("  Findings created: {}", stats.findings_created);
    if stats.errors > 0 {
        println!("  Errors:           {}", style(stats.errors).red());
        for failure in &report.errors {
            let stage = match failure.stage {
                FailureStage::Fetch => "fetch",
                FailureStage::Extraction => "extract",
            };
            println!(
                "    {} {}: {}",
                style(stage).dim(),
                failure.source_name,
                failure.message
            );
        }
    } else {
        println!("  Errors:           0");
    }
    println!("  Time:             {:.1}s", stats.duration.as_secs_f64());
    println!();
}

pub(crate) fn print_findings(findings: &[FindingRecord], today: NaiveDate) {
    if findings.is_empty() {
        println!("{}", style("No findings to show.").green());
        return;
    }

    let count = |impact| findings.iter().filter(|f| f.finding.impact == impact).count();
    let header = Style::new().cyan();
    println!("{}", rule(&header));
    println!("{}", header.apply_to("COMPLIANCE FINDINGS"));
    println!(
        "Total: {} | HIGH: {} | MEDIUM: {} | LOW: {}",
        findings.len(),
        count(Impact::High),
        count(Impact::Medium),
        count(Impact::Low)
    );
    println!("{}", rule(&header));

    for record in findings {
        print_finding(record, today);
    }
}

fn print_finding(record: &FindingRecord, today: NaiveDate) {
    let f = &record.finding;
    let accent = impact_style(f.impact);

    println!();
    println!("{}", rule(&accent));
    println!(
        "{}: {}",
        accent.apply_to(format!("{} PRIORITY", f.impact.as_str().to_uppercase())),
        style(&f.title).cyan()
    );

    match f.deadline {
        Some(deadline) => {
            let days = days_remaining(deadline, today);
            match DeadlineStatus::classify(deadline, today) {
                DeadlineStatus::Overdue => {
                    println!("{}", style(format!("OVERDUE by {} days", -days)).red().bold())
                }
                DeadlineStatus::Urgent => {
                    println!("{}", style(format!("Deadline: {deadline} ({days} days)")).red())
                }
                DeadlineStatus::Upcoming => {
                    println!("{}", style(format!("Deadline: {deadline} ({days} days)")).yellow())
                }
                DeadlineStatus::Later => println!("Deadline: {deadline} ({days} days)"),
            }
        }
        None => println!("Deadline: not specified"),
    }

    let mut scope = Vec::new();
    if !f.categories.is_empty() {
        scope.push(format!("Categories: {}", f.categories.join(", ")));
    }
    if !f.regions.is_empty() {
        scope.push(format!("Regions: {}", f.regions.join(", ")));
    }
    if !scope.is_empty() {
        println!("{}", scope.join(" | "));
    }
    if !f.transaction_types.is_empty() {
        println!("Transaction types: {}", f.transaction_types.join(", "));
    }

    if !f.summary.is_empty() {
        println!();
        println!("{}", style("Summary:").bold());
        println!("  {}", f.summary);
    }

    if !f.technical_requirements.is_empty() {
        println!();
        println!("{}", style("Technical requirements:").bold());
        for req in f.technical_requirements.iter().take(MAX_REQUIREMENTS) {
            println!("  • {req}");
        }
        let hidden = f.technical_requirements.len().saturating_sub(MAX_REQUIREMENTS);
        if hidden > 0 {
            println!("  ... and {hidden} more");
        }
    }

    println!();
    println!("Relevance: {}/10", f.relevance_score);
    println!("Source: {}", record.source_name);
    println!("{}", style(&record.source_url).blue());
    println!("{}", rule(&accent));
}

pub(crate) fn print_source(source: &Source) {
    let state = if source.active {
        style("active").green()
    } else {
        style("inactive").dim()
    };
    println!("{} [{}] {}", style(&source.name).bold(), source.kind, state);
    println!("    {}", source.url);
}
