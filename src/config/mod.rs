//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (see [`find_config_file`]), then `RESEARCH_HARVEST__SECTION__KEY`
//! environment variables.

mod file_config;

pub use file_config::{default_config_path, find_config_file, save_config, CONFIG_FILE_NAME};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{QueryTemplate, SourceType, SubQuery};
use crate::pipeline::ParseFailurePolicy;
use crate::utils::{FixedDelay, RateGate};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "RESEARCH_HARVEST";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Sub-queries and the keyword groups they are combined with
    #[serde(default)]
    pub query: QueryConfig,

    /// Per-source caps and page sizes
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Spacing between requests to the same source
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Base URLs, for pointing sources at mirrors or test servers
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Elsevier key sent as `X-ELS-APIKey`
    #[serde(default = "default_scopus_key")]
    pub scopus: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            scopus: default_scopus_key(),
        }
    }
}

fn default_scopus_key() -> Option<String> {
    std::env::var("SCOPUS_API_KEY").ok()
}

/// Query settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// One sub-query per term (PubMed, Scopus)
    #[serde(default)]
    pub terms: Vec<String>,

    /// Keyword groups AND'ed onto every term
    #[serde(default)]
    pub groups: Vec<Vec<String>>,

    /// Earliest publication year for term searches
    #[serde(default)]
    pub min_year: Option<i32>,

    /// Title search split by year (OpenAlex)
    #[serde(default)]
    pub base_query: Option<String>,

    #[serde(default = "default_year_from")]
    pub year_from: i32,

    #[serde(default = "default_year_to")]
    pub year_to: i32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            groups: Vec::new(),
            min_year: None,
            base_query: None,
            year_from: default_year_from(),
            year_to: default_year_to(),
        }
    }
}

fn default_year_from() -> i32 {
    2016
}

fn default_year_to() -> i32 {
    chrono::Utc::now().year()
}

impl QueryConfig {
    pub fn template(&self) -> QueryTemplate {
        QueryTemplate {
            groups: self.groups.clone(),
            min_year: self.min_year,
        }
    }
}

/// Caps and page sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Identifiers requested per PubMed sub-query (`retmax`)
    #[serde(default = "default_pubmed_cap")]
    pub pubmed_cap: usize,

    #[serde(default = "default_pubmed_batch_size")]
    pub pubmed_batch_size: usize,

    /// Records per OpenAlex year
    #[serde(default = "default_openalex_cap")]
    pub openalex_cap: usize,

    #[serde(default = "default_openalex_page_size")]
    pub openalex_page_size: usize,

    #[serde(default = "default_scopus_cap")]
    pub scopus_cap: usize,

    #[serde(default = "default_scopus_page_size")]
    pub scopus_page_size: usize,

    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            pubmed_cap: default_pubmed_cap(),
            pubmed_batch_size: default_pubmed_batch_size(),
            openalex_cap: default_openalex_cap(),
            openalex_page_size: default_openalex_page_size(),
            scopus_cap: default_scopus_cap(),
            scopus_page_size: default_scopus_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_pubmed_cap() -> usize {
    800
}

fn default_pubmed_batch_size() -> usize {
    50
}

fn default_openalex_cap() -> usize {
    1500
}

fn default_openalex_page_size() -> usize {
    50
}

fn default_scopus_cap() -> usize {
    800
}

fn default_scopus_page_size() -> usize {
    25
}

fn default_timeout_secs() -> u64 {
    30
}

impl LimitsConfig {
    /// Per-sub-query record cap for a source
    pub fn cap(&self, source: SourceType) -> usize {
        match source {
            SourceType::PubMed => self.pubmed_cap,
            SourceType::OpenAlex => self.openalex_cap,
            SourceType::Scopus => self.scopus_cap,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_pubmed_delay")]
    pub pubmed_delay_ms: u64,

    #[serde(default = "default_polite_delay")]
    pub openalex_delay_ms: u64,

    #[serde(default = "default_polite_delay")]
    pub scopus_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            pubmed_delay_ms: default_pubmed_delay(),
            openalex_delay_ms: default_polite_delay(),
            scopus_delay_ms: default_polite_delay(),
        }
    }
}

fn default_pubmed_delay() -> u64 {
    500
}

fn default_polite_delay() -> u64 {
    1000
}

impl RateLimitConfig {
    pub fn delay(&self, source: SourceType) -> Duration {
        let ms = match source {
            SourceType::PubMed => self.pubmed_delay_ms,
            SourceType::OpenAlex => self.openalex_delay_ms,
            SourceType::Scopus => self.scopus_delay_ms,
        };
        Duration::from_millis(ms)
    }

    /// A fresh gate for one adapter instance
    pub fn gate(&self, source: SourceType) -> Arc<dyn RateGate> {
        Arc::new(FixedDelay::new(self.delay(source)))
    }
}

/// Endpoint overrides; unset means the public API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// E-utilities base, e.g. `https://eutils.ncbi.nlm.nih.gov/entrez/eutils`
    #[serde(default)]
    pub pubmed: Option<String>,

    #[serde(default)]
    pub openalex: Option<String>,

    /// Full Scopus search URL
    #[serde(default)]
    pub scopus: Option<String>,

    /// Contact address for the OpenAlex polite pool
    #[serde(default)]
    pub openalex_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// `abandon` (default) or `fatal`
    #[serde(default)]
    pub parse_failure: ParseFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Sub-queries a source runs with under this configuration
    pub fn sub_queries(&self, source: SourceType) -> Result<Vec<SubQuery>, ConfigError> {
        match source {
            SourceType::PubMed | SourceType::Scopus => {
                if self.query.terms.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "{} needs at least one entry in query.terms",
                        source.name()
                    )));
                }
                Ok(SubQuery::from_terms(self.query.terms.iter().cloned()))
            }
            SourceType::OpenAlex => {
                let base = self
                    .query
                    .base_query
                    .as_deref()
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| ConfigError::Invalid("OpenAlex needs query.base_query".into()))?;
                Ok(SubQuery::year_range(base, self.query.year_from, self.query.year_to))
            }
        }
    }

    /// The Scopus key, required before any Scopus request is made
    pub fn scopus_api_key(&self) -> Result<&str, ConfigError> {
        self.api_keys
            .scopus
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "Scopus API key missing: set api_keys.scopus or SCOPUS_API_KEY".into(),
                )
            })
    }

    /// Reject settings no run could make progress with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        let sizes = [
            ("limits.pubmed_batch_size", limits.pubmed_batch_size),
            ("limits.openalex_page_size", limits.openalex_page_size),
            ("limits.scopus_page_size", limits.scopus_page_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(ConfigError::Invalid(format!("{} must be positive", name)));
        }
        if self.query.year_from > self.query.year_to {
            return Err(ConfigError::Invalid(format!(
                "query.year_from ({}) is after query.year_to ({})",
                self.query.year_from, self.query.year_to
            )));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Load configuration from an optional file plus the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("query.terms")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.limits.pubmed_cap, 800);
        assert_eq!(config.limits.openalex_cap, 1500);
        assert_eq!(config.limits.scopus_page_size, 25);
        assert_eq!(config.rate_limits.delay(SourceType::PubMed), Duration::from_millis(500));
        assert_eq!(config.rate_limits.delay(SourceType::Scopus), Duration::from_secs(1));
        assert_eq!(config.query.year_from, 2016);
        assert!(config.query.year_to >= 2025);
        assert_eq!(config.pipeline.parse_failure, ParseFailurePolicy::Abandon);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[api_keys]
scopus = "file-key"

[query]
terms = ["deep learning", "radiomics"]
groups = [["cancer", "tumor"], ["MRI"]]
min_year = 2018

[limits]
scopus_cap = 100

[pipeline]
parse_failure = "fatal"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = load_config(Some(path.as_path())).unwrap();

        assert_eq!(config.scopus_api_key().unwrap(), "file-key");
        assert_eq!(config.query.terms, vec!["deep learning", "radiomics"]);
        assert_eq!(config.query.template().min_year, Some(2018));
        assert_eq!(config.limits.cap(SourceType::Scopus), 100);
        assert_eq!(config.limits.cap(SourceType::PubMed), 800);
        assert_eq!(config.pipeline.parse_failure, ParseFailurePolicy::Fatal);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = PathBuf::from("/nonexistent/research-harvest.toml");
        assert!(load_config(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_invalid_year_range_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[query]\nyear_from = 2024\nyear_to = 2020\n").unwrap();

        let err = load_config(Some(path.as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_sub_queries_per_source() {
        let mut config = Config::default();
        config.query.terms = vec!["a".into(), "b".into()];
        config.query.base_query = Some("machine learning".into());
        config.query.year_from = 2020;
        config.query.year_to = 2022;

        let terms = config.sub_queries(SourceType::Scopus).unwrap();
        assert_eq!(terms, vec![SubQuery::term("a"), SubQuery::term("b")]);

        let years = config.sub_queries(SourceType::OpenAlex).unwrap();
        assert_eq!(years.len(), 3);
        assert_eq!(years[0], SubQuery::for_year("machine learning", 2020));
    }

    #[test]
    fn test_sub_queries_require_input() {
        let config = Config::default();
        assert!(config.sub_queries(SourceType::PubMed).is_err());
        assert!(config.sub_queries(SourceType::OpenAlex).is_err());
    }

    #[test]
    fn test_blank_scopus_key_rejected() {
        let mut config = Config::default();
        config.api_keys.scopus = Some("  ".into());
        assert!(config.scopus_api_key().is_err());
    }
}
