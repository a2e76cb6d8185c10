use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embedder::ModelName;
use crate::error::{Result, SearchError};
use crate::models::FieldWeights;
use crate::normalize::Normalizer;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub namespace: String,
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("resume-search")
                .join("db"),
            namespace: "resumes".into(),
            database: "candidates".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    pub model: ModelName,
    pub show_download_progress: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: ModelName::default(),
            show_download_progress: true,
        }
    }
}

/// What a weighted search does when one field's lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole search with the field's error.
    #[default]
    Abort,
    /// Skip the field and report it in the response.
    Degrade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Replaces the default weights wholesale; omitted fields weigh 0.
    pub weights: FieldWeights,
    pub per_field_floor: usize,
    pub per_field_multiplier: usize,
    pub on_field_failure: FailurePolicy,
    pub normalization: Normalizer,
}

impl SearchConfig {
    /// Candidates fetched per field for a search returning `num_results`.
    /// Always more than `num_results`.
    pub fn per_field_limit(&self, num_results: usize) -> usize {
        num_results
            .saturating_mul(self.per_field_multiplier)
            .max(self.per_field_floor)
            .max(num_results.saturating_add(1))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            weights: FieldWeights::default(),
            per_field_floor: 40,
            per_field_multiplier: 4,
            on_field_failure: FailurePolicy::default(),
            normalization: Normalizer::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .map_err(|e| SearchError::Config(format!("failed to read {}: {e}", path.display())))?;
    let config = parse(&raw)
        .map_err(|e| SearchError::Config(format!("{}: {e}", path.display())))?;
    Ok(config)
}

pub fn parse(raw: &str) -> Result<Config> {
    let config: Config = toml::from_str(raw).map_err(|e| SearchError::Config(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.search.per_field_floor == 0 {
        return Err(SearchError::Config(
            "search.per_field_floor must be greater than zero".into(),
        ));
    }
    if config.search.per_field_multiplier == 0 {
        return Err(SearchError::Config(
            "search.per_field_multiplier must be greater than zero".into(),
        ));
    }
    if config.store.namespace.trim().is_empty() || config.store.database.trim().is_empty() {
        return Err(SearchError::Config(
            "store.namespace and store.database must be non-empty".into(),
        ));
    }
    Ok(())
}
