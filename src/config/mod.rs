use crate::input::rules::DerivationRule;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Target site and fetch behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// `name` attribute of the form that must be present on the search page.
    #[serde(default = "default_search_form")]
    pub search_form: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_mapping_path")]
    pub mapping: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// How the input sheet is laid out and how missing search names are derived.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Column key → header title as it appears in the sheet.
    #[serde(default = "default_input_columns")]
    pub columns: BTreeMap<String, String>,

    #[serde(default = "default_strip_symbols")]
    pub strip_symbols: Vec<String>,

    #[serde(default = "default_status_column")]
    pub status_column: String,

    #[serde(default)]
    pub rules: Vec<DerivationRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// `{}` is replaced by the run timestamp.
    #[serde(default = "default_results_file")]
    pub results_file: String,

    #[serde(default = "default_date_format")]
    pub date_format: String,

    #[serde(default = "default_processed_file")]
    pub processed_file: String,

    #[serde(default = "default_non_processed_file")]
    pub non_processed_file: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

pub const SEARCH_NAME_KEY: &str = "search_name";

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_search_url() -> String {
    "https://www.fpds.gov/ezsearch/fpdsportal".to_string()
}
fn default_search_form() -> String {
    "search_awardfull".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "fpds-scraper/0.1 (contract lookup bot)".to_string()
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_pool_size() -> usize {
    4
}
fn default_mapping_path() -> PathBuf {
    PathBuf::from("config/mapping.json")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}
fn default_input_columns() -> BTreeMap<String, String> {
    BTreeMap::from([(SEARCH_NAME_KEY.to_string(), "Search Name".to_string())])
}
fn default_strip_symbols() -> Vec<String> {
    vec!["contract_num".to_string()]
}
fn default_status_column() -> String {
    "Found".to_string()
}
fn default_results_file() -> String {
    "fpds_results_{}.csv".to_string()
}
fn default_date_format() -> String {
    "%Y%m%d_%H%M%S".to_string()
}
fn default_processed_file() -> String {
    "processed.csv".to_string()
}
fn default_non_processed_file() -> String {
    "non_processed.csv".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            search_form: default_search_form(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { pool_size: default_pool_size() }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            mapping: default_mapping_path(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            columns: default_input_columns(),
            strip_symbols: default_strip_symbols(),
            status_column: default_status_column(),
            rules: Vec::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_file: default_results_file(),
            date_format: default_date_format(),
            processed_file: default_processed_file(),
            non_processed_file: default_non_processed_file(),
        }
    }
}

impl ScraperConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("FPDS").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.pool_size == 0 {
            bail!("pipeline.pool_size must be at least 1");
        }
        if self.scraper.retry_attempts == 0 {
            bail!("scraper.retry_attempts must be at least 1");
        }
        url::Url::parse(&self.scraper.search_url)
            .with_context(|| format!("scraper.search_url is not a URL: {}", self.scraper.search_url))?;

        if !self.input.columns.contains_key(SEARCH_NAME_KEY) {
            bail!("input.columns must define '{}'", SEARCH_NAME_KEY);
        }
        for rule in &self.input.rules {
            rule.check_fields(&self.input.columns)
                .with_context(|| format!("input rule '{}'", rule.name))?;
        }
        Ok(())
    }
}
