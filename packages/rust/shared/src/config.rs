//! Application configuration for Regwatch.
//!
//! User config lives at `~/.regwatch/regwatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RegwatchError, Result};
use crate::types::ConsumerProfile;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "regwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".regwatch";

// ---------------------------------------------------------------------------
// Config structs (matching regwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage location.
    #[serde(default)]
    pub system: SystemConfig,

    /// Fetcher settings.
    #[serde(default)]
    pub scraping: ScrapingConfig,

    /// Extraction service settings.
    #[serde(default)]
    pub intelligence: IntelligenceConfig,

    /// Display/report filters.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Consumer profile used for relevance scoring.
    #[serde(default)]
    pub profile: ConsumerProfile,

    /// Monitored documents, loaded into the store by `regwatch init`.
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

/// `[system]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Directory holding the database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Database file name inside `data_dir`.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
        }
    }
}

impl SystemConfig {
    /// Full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.database_file)
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_database_file() -> String {
    "regwatch.db".into()
}

/// `[scraping]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent to origins.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Minimum ms between the end of one request and the start of the next.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Total attempts per fetch (first try included).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the second attempt; doubles for each further attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            rate_limit_ms: default_rate_limit(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("Regwatch/", env!("CARGO_PKG_VERSION")).into()
}
fn default_rate_limit() -> u64 {
    3000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    1000
}

/// `[intelligence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for extraction.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Messages API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound on a single extraction call.
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_base_url() -> String {
    "https://api.anthropic.com/v1".into()
}
fn default_extraction_timeout() -> u64 {
    120
}

/// `[alerts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Findings below this score are hidden from `list`.
    #[serde(default = "default_min_relevance")]
    pub min_relevance_score: u8,

    /// Only show high-impact findings.
    #[serde(default)]
    pub high_priority_only: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            min_relevance_score: default_min_relevance(),
            high_priority_only: false,
        }
    }
}

fn default_min_relevance() -> u8 {
    5
}

/// `[[sources]]` entry: a document to monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Display name.
    pub name: String,
    /// Document locator.
    pub url: String,
    /// Category/type tag.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Whether the source is scanned.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_kind() -> String {
    "web".into()
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.regwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| RegwatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.regwatch/regwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RegwatchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RegwatchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RegwatchError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RegwatchError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| RegwatchError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

/// Check that the extraction API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.intelligence.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(()),
        _ => Err(RegwatchError::config(format!(
            "extraction API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every configured source has a name and an http(s) locator.
pub fn validate_sources(config: &AppConfig) -> Result<()> {
    for entry in &config.sources {
        if entry.name.trim().is_empty() {
            return Err(RegwatchError::config(format!(
                "source with url '{}' has an empty name",
                entry.url
            )));
        }
        let url = Url::parse(&entry.url).map_err(|e| {
            RegwatchError::config(format!("source '{}' has invalid url: {e}", entry.name))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RegwatchError::config(format!(
                "source '{}' must use http or https, got '{}'",
                entry.name,
                url.scheme()
            )));
        }
    }
    Ok(())
}

/// Check that the consumer profile gives the scorer something to match on.
pub fn validate_profile(config: &AppConfig) -> Result<()> {
    if config.profile.is_empty() {
        return Err(RegwatchError::config(
            "the [profile] section is empty. Add categories, regions, or keywords to score findings against.",
        ));
    }
    Ok(())
}
