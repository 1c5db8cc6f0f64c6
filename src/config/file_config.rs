//! Configuration file discovery and persistence.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api_keys]
//! scopus = "your-elsevier-key"
//!
//! [query]
//! terms = ["deep learning", "radiomics"]
//! groups = [["cancer", "tumor"], ["MRI", "CT"]]
//! min_year = 2018
//! base_query = "machine learning"
//! year_from = 2016
//! year_to = 2025
//!
//! [limits]
//! pubmed_cap = 800
//! pubmed_batch_size = 50
//! openalex_cap = 1500
//! openalex_page_size = 50
//! scopus_cap = 800
//! scopus_page_size = 25
//! timeout_secs = 30
//!
//! [rate_limits]
//! pubmed_delay_ms = 500
//! openalex_delay_ms = 1000
//! scopus_delay_ms = 1000
//!
//! [endpoints]
//! openalex_mailto = "you@example.org"
//!
//! [pipeline]
//! parse_failure = "abandon"
//!
//! [output]
//! directory = "./harvest"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "research-harvest.toml";

/// `<config_dir>/research-harvest/config.toml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("research-harvest").join("config.toml"))
}

/// Locate the configuration file to load.
///
/// An explicit path always wins, even if it does not exist (loading it will
/// then fail loudly). Otherwise `./research-harvest.toml` and then the
/// per-user config file are tried.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    default_config_path().filter(|path| path.is_file())
}

/// Save configuration to a TOML file, creating parent directories
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
    }
    std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_path_wins() {
        let path = PathBuf::from("/somewhere/custom.toml");
        assert_eq!(find_config_file(Some(path.as_path())), Some(path));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.api_keys.scopus = Some("saved-key".to_string());
        config.query.terms = vec!["genomics".to_string()];
        config.rate_limits.scopus_delay_ms = 2000;

        save_config(&config, &path).unwrap();

        let loaded = load_config(Some(path.as_path())).unwrap();
        assert_eq!(loaded.api_keys.scopus, Some("saved-key".to_string()));
        assert_eq!(loaded.query.terms, vec!["genomics"]);
        assert_eq!(loaded.rate_limits.scopus_delay_ms, 2000);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "invalid = toml = content").unwrap();

        assert!(load_config(Some(path.as_path())).is_err());
    }
}
