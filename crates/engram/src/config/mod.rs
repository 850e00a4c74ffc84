use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, Result};

/// Main configuration structure for Engram
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Where persistent data lives
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Capacity, compaction and query defaults
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists, falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".engram").join("config.toml")),
            dirs::config_dir().map(|c| c.join("engram").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| MemoryError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier (all-minilm-l6-v2, multilingual-e5-small, bge-small-en-v1.5)
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimension; every stored vector must have exactly this length
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Where downloaded model files are cached (fastembed default when unset)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Print download progress when fetching a model for the first time
    #[serde(default)]
    pub show_download_progress: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            cache_dir: None,
            show_download_progress: false,
        }
    }
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

/// Capacity bound, compaction trigger and query defaults
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Maximum cached entries before a store triggers compaction
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Seconds between interval-triggered compactions
    #[serde(default = "default_compaction_interval_secs")]
    pub compaction_interval_secs: u64,
    /// Result count used when a search does not specify one
    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,
    /// Similarity floor used when a search does not specify one
    #[serde(default = "default_min_similarity")]
    pub default_min_similarity: f32,
    /// Node cap used when a graph build does not specify one
    #[serde(default = "default_max_nodes")]
    pub default_max_nodes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            compaction_interval_secs: default_compaction_interval_secs(),
            default_search_limit: default_search_limit(),
            default_min_similarity: default_min_similarity(),
            default_max_nodes: default_max_nodes(),
        }
    }
}

impl MemoryConfig {
    /// Override the capacity bound
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Override the compaction interval
    pub fn with_compaction_interval_secs(mut self, secs: u64) -> Self {
        self.compaction_interval_secs = secs;
        self
    }
}

fn default_max_entries() -> usize {
    10_000
}

fn default_compaction_interval_secs() -> u64 {
    3600
}

fn default_search_limit() -> usize {
    10
}

fn default_min_similarity() -> f32 {
    0.3
}

fn default_max_nodes() -> usize {
    50
}
