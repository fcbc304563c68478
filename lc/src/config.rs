//! langcache configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::registry::DEFAULT_EVENT_CAPACITY;

/// Main langcache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Aggregated change stream settings
    pub events: EventsConfig,

    /// Load coordination settings
    pub loader: LoaderConfig,
}

impl Config {
    /// Load `path` if given, else the first file found in [`Config::search_paths`], else defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path).context(format!("Failed to load config from {}", path.display())),
            None => Ok(Self::load_first(&Self::search_paths()).unwrap_or_default()),
        }
    }

    /// Locations searched when no explicit path is given, in priority order
    pub fn search_paths() -> Vec<PathBuf> {
        [
            Some(PathBuf::from(".langcache.yml")),
            dirs::config_dir().map(|dir| dir.join("langcache").join("langcache.yml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// First candidate that exists and parses; unreadable candidates are skipped
    fn load_first(candidates: &[PathBuf]) -> Option<Self> {
        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return Some(config),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping config file"),
            }
        }
        tracing::debug!(candidates = candidates.len(), "No config file found, using defaults");
        None
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config")
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;
        tracing::info!(path = %path.as_ref().display(), "Loaded config");
        Ok(config)
    }
}

/// Aggregated change stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events buffered per subscriber before the slowest one starts lagging
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Load coordination configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Abort waiting on a load after this many milliseconds (no limit if unset)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Language reported as current before any language is selected
    #[serde(rename = "default-lang")]
    pub default_lang: Option<String>,
}

impl LoaderConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.events.capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.loader.timeout(), None);
        assert_eq!(config.loader.default_lang, None);
    }

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
events:
  capacity: 64
loader:
  timeout-ms: 2500
  default-lang: en
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.events.capacity, 64);
        assert_eq!(config.loader.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.loader.default_lang.as_deref(), Some("en"));
    }

    #[test]
    fn test_from_yaml_partial_uses_defaults() {
        let config = Config::from_yaml("loader:\n  default-lang: de\n").unwrap();
        assert_eq!(config.events.capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.loader.timeout_ms, None);
        assert_eq!(config.loader.default_lang.as_deref(), Some("de"));
    }

    #[test]
    fn test_from_yaml_invalid() {
        assert!(Config::from_yaml("events: [not, a, map]").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "events:\n  capacity: 8").unwrap();

        let path = file.path().to_path_buf();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.events.capacity, 8);
    }

    #[test]
    fn test_load_first_skips_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yml");
        let invalid = dir.path().join("invalid.yml");
        let valid = dir.path().join("valid.yml");
        fs::write(&invalid, "events: [not, a, map]").unwrap();
        fs::write(&valid, "loader:\n  timeout-ms: 40\n").unwrap();

        let config = Config::load_first(&[missing, invalid, valid]).unwrap();
        assert_eq!(config.loader.timeout(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_load_first_without_candidates() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_first(&[dir.path().join("absent.yml")]).is_none());
    }

    #[test]
    fn test_search_paths_starts_with_project_file() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(".langcache.yml"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/langcache.yml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config from"));
    }
}
