//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use regwatch_core::{demo, export};
use regwatch_core::{ClaudeExtractor, ProgressReporter, ScanOptions, ScanPhase, ScanReport, run_scan};
use regwatch_detector::ChangeDetector;
use regwatch_fetcher::Fetcher;
use regwatch_shared::{
    AppConfig, Impact, Source, config_file_path, init_config_at, load_config, load_config_from,
    validate_api_key, validate_profile, validate_sources,
};
use regwatch_storage::{FindingQuery, Storage};

use crate::render;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Regwatch: compliance document change monitor.
#[derive(Parser)]
#[command(
    name = "regwatch",
    version,
    about = "Watch compliance documents for changes and score what they mean for you.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.regwatch/regwatch.toml).
    #[arg(long, global = true, env = "REGWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Export file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ExportFormat {
    Csv,
    Json,
    Html,
    All,
}

impl ExportFormat {
    fn includes(self, format: ExportFormat) -> bool {
        self == Self::All || self == format
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create the database and register the configured sources.
    Init,

    /// Run one scan cycle over all active sources.
    Scan,

    /// Show recorded findings.
    List {
        /// Only this impact level (high, medium, low).
        #[arg(long)]
        impact: Option<Impact>,

        /// Minimum relevance score (defaults to `alerts.min_relevance_score`).
        #[arg(long)]
        min_relevance: Option<u8>,
    },

    /// Show aggregate counts over recorded findings.
    Stats,

    /// Load sample findings so listing and exports can be tried offline.
    Demo,

    /// Export findings to CSV, dashboard JSON, an HTML report, or all three.
    Export {
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Only this impact level (high, medium, low).
        #[arg(long)]
        impact: Option<Impact>,

        /// Minimum relevance score.
        #[arg(long, default_value_t = 0)]
        min_relevance: u8,

        /// Directory to write into.
        #[arg(long, default_value = "exports")]
        output_dir: PathBuf,
    },

    /// Manage monitored sources.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Source subcommands.
#[derive(Subcommand)]
pub(crate) enum SourcesAction {
    /// List registered sources.
    List,
    /// Stop scanning a source. Its history is kept.
    Deactivate {
        /// Locator of the source.
        url: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "regwatch=info",
        1 => "regwatch=debug",
        _ => "regwatch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Init => cmd_init(config_path).await,
        Command::Scan => cmd_scan(config_path).await,
        Command::List {
            impact,
            min_relevance,
        } => cmd_list(config_path, impact, min_relevance).await,
        Command::Stats => cmd_stats(config_path).await,
        Command::Demo => cmd_demo(config_path).await,
        Command::Export {
            format,
            impact,
            min_relevance,
            output_dir,
        } => cmd_export(config_path, format, impact, min_relevance, &output_dir).await,
        Command::Sources { action } => match action {
            SourcesAction::List => cmd_sources_list(config_path).await,
            SourcesAction::Deactivate { url } => cmd_sources_deactivate(config_path, &url).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    validate_sources(&config)?;
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = config.system.database_path();
    info!(path = %path.display(), "opening database");
    Ok(Storage::open(&path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_init(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    for entry in &config.sources {
        storage
            .upsert_source(&entry.name, &entry.url, &entry.kind, entry.active)
            .await?;
    }

    let active = storage.list_active_sources().await?.len();
    println!();
    println!("  Database ready: {}", config.system.database_path().display());
    println!("  Sources:        {} configured, {active} active", config.sources.len());
    println!();
    Ok(())
}

async fn cmd_scan(config_path: Option<&Path>) -> Result<()> {
    // Validate credentials and profile before doing anything
    let config = resolve_config(config_path)?;
    validate_api_key(&config)?;
    validate_profile(&config)?;

    let storage = open_storage(&config).await?;
    let fetcher = Fetcher::from_config(config.scraping.clone())?;
    let extractor = ClaudeExtractor::from_env(config.intelligence.clone())?;
    let detector = ChangeDetector::new();
    let options = ScanOptions {
        extraction_timeout: Duration::from_secs(config.intelligence.timeout_secs),
    };

    let reporter = CliProgress::new();
    let outcome = run_scan(
        &storage,
        &fetcher,
        &detector,
        &extractor,
        &config.profile,
        &options,
        &reporter,
    )
    .await;

    // Aborted cycles still report their partial counts before the error.
    if let Some(report) = reporter.report() {
        render::print_scan_report(report);
    }
    let report = outcome?;

    if report.stats.findings_created > 0 {
        let query = alert_query(&config, None, None);
        let findings = storage.list_findings(&query).await?;
        render::print_findings(&findings, Local::now().date_naive());
    }
    Ok(())
}

/// Default `list` filter from the `[alerts]` section, overridden by flags.
fn alert_query(config: &AppConfig, impact: Option<Impact>, min_relevance: Option<u8>) -> FindingQuery {
    let impact = impact.or(config.alerts.high_priority_only.then_some(Impact::High));
    FindingQuery {
        min_relevance: min_relevance.unwrap_or(config.alerts.min_relevance_score),
        impact,
    }
}

async fn cmd_list(
    config_path: Option<&Path>,
    impact: Option<Impact>,
    min_relevance: Option<u8>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let findings = storage
        .list_findings(&alert_query(&config, impact, min_relevance))
        .await?;
    render::print_findings(&findings, Local::now().date_naive());
    Ok(())
}

async fn cmd_stats(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let stats = storage.finding_stats(Local::now().date_naive()).await?;
    let pending = storage.list_unprocessed_changes().await?.len();
    let sources = storage.list_sources().await?;
    let active = sources.iter().filter(|s| s.active).count();

    println!();
    println!("  Sources:             {} ({active} active)", sources.len());
    println!("  Pending changes:     {pending}");
    println!("  Findings:            {}", stats.total);
    println!("    high / medium / low: {} / {} / {}", stats.high, stats.medium, stats.low);
    println!("  With deadline:       {}", stats.with_deadline);
    println!("  Due within 30 days:  {}", stats.urgent);
    println!();
    Ok(())
}

async fn cmd_demo(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let source = demo::seed_demo(&storage, &config.profile, Local::now().date_naive()).await?;
    println!();
    println!("  Demo findings recorded: {}", demo::demo_item_count());
    println!("  Source:                 {} (inactive)", source.name);
    println!();
    println!("Next: `regwatch list` or `regwatch export --format all`");
    Ok(())
}

async fn cmd_export(
    config_path: Option<&Path>,
    format: ExportFormat,
    impact: Option<Impact>,
    min_relevance: u8,
    output_dir: &Path,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let findings = storage
        .list_findings(&FindingQuery {
            min_relevance,
            impact,
        })
        .await?;
    if findings.is_empty() {
        println!("No findings match; writing empty export.");
    }

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let today = Local::now().date_naive();
    if format.includes(ExportFormat::Csv) {
        let path = output_dir.join(format!("findings_{stamp}.csv"));
        export::write_csv(&findings, &path, today)?;
        println!("CSV exported: {}", path.display());
    }
    if format.includes(ExportFormat::Json) {
        let path = output_dir.join("data.json");
        export::write_json(&findings, &path, Utc::now())?;
        println!("Dashboard data exported: {}", path.display());
    }
    if format.includes(ExportFormat::Html) {
        let path = output_dir.join(format!("report_{stamp}.html"));
        export::write_html(&findings, &path, today, Utc::now())?;
        println!("HTML report exported: {}", path.display());
    }
    println!("Total findings: {}", findings.len());
    Ok(())
}

async fn cmd_sources_list(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let sources = storage.list_sources().await?;
    if sources.is_empty() {
        println!("No sources registered. Add [[sources]] to the config and run `regwatch init`.");
        return Ok(());
    }
    for source in &sources {
        render::print_source(source);
    }
    Ok(())
}

async fn cmd_sources_deactivate(config_path: Option<&Path>, url: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    if !storage.set_source_active(url, false).await? {
        return Err(eyre!("no source registered with url '{url}'"));
    }
    println!("Deactivated: {url}");
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if path.exists() {
        return Err(eyre!("config already exists at {}", path.display()));
    }
    let path = init_config_at(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner. Keeps the final report,
/// which is the only way to see the counts of an aborted cycle.
struct CliProgress {
    spinner: ProgressBar,
    report: OnceLock<ScanReport>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            report: OnceLock::new(),
        }
    }

    fn report(&self) -> Option<&ScanReport> {
        self.report.get()
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: ScanPhase) {
        self.spinner.set_message(phase.label().to_string());
    }

    fn source_fetched(&self, source: &Source, ok: bool, current: usize, total: usize) {
        let mark = if ok { "ok" } else { "failed" };
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {} ({mark})", source.name));
    }

    fn change_extracted(&self, source_name: &str, ok: bool, current: usize, total: usize) {
        let mark = if ok { "ok" } else { "failed" };
        self.spinner
            .set_message(format!("Extracting [{current}/{total}] {source_name} ({mark})"));
    }

    fn done(&self, report: &ScanReport) {
        self.spinner.finish_and_clear();
        let _ = self.report.set(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regwatch_shared::ScanStats;

    #[test]
    fn progress_keeps_the_report_of_an_aborted_cycle() {
        let progress = CliProgress::new();
        assert!(progress.report().is_none());

        progress.done(&ScanReport {
            stats: ScanStats {
                sources_scanned: 3,
                changes_detected: 2,
                findings_created: 1,
                ..ScanStats::default()
            },
            phase: ScanPhase::Aborted,
            errors: Vec::new(),
        });

        let report = progress.report().expect("report kept");
        assert_eq!(report.phase, ScanPhase::Aborted);
        assert_eq!(report.stats.findings_created, 1);
    }

    #[test]
    fn export_format_all_covers_every_format() {
        for format in [ExportFormat::Csv, ExportFormat::Json, ExportFormat::Html] {
            assert!(ExportFormat::All.includes(format));
            assert!(format.includes(format));
        }
        assert!(!ExportFormat::Csv.includes(ExportFormat::Html));
    }
}
