//! Text embedding providers
//!
//! The manager only sees [`EmbeddingProvider`]. [`FastEmbedProvider`] runs a
//! local ONNX sentence-embedding model through `fastembed`; tests use the
//! deterministic providers in [`crate::testing`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, for logs and stats
    fn name(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one call per text unless overridden
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Resolve a configured model name to a fastembed model
fn resolve_model(name: &str) -> Result<FastEmbedModel> {
    match name.to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok(FastEmbedModel::AllMiniLML6V2),
        "multilingual-e5-small" => Ok(FastEmbedModel::MultilingualE5Small),
        "bge-small-en-v1.5" => Ok(FastEmbedModel::BGESmallENV15),
        other => Err(MemoryError::Config(format!(
            "Unsupported embedding model: {other}. Supported: all-minilm-l6-v2, multilingual-e5-small, bge-small-en-v1.5"
        ))),
    }
}

type SharedModel = Arc<Mutex<TextEmbedding>>;

/// Local embeddings via fastembed.
///
/// The model is downloaded and loaded on the first embed call, not at
/// construction. A failed load is reported as [`MemoryError::Initialization`]
/// and attempted again on the next call.
pub struct FastEmbedProvider {
    name: String,
    model: FastEmbedModel,
    cache_dir: Option<PathBuf>,
    show_download_progress: bool,
    loaded: OnceCell<SharedModel>,
}

impl FastEmbedProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            name: config.model.clone(),
            model: resolve_model(&config.model)?,
            cache_dir: config.cache_dir.clone(),
            show_download_progress: config.show_download_progress,
            loaded: OnceCell::new(),
        })
    }

    async fn model(&self) -> Result<SharedModel> {
        let model = self
            .loaded
            .get_or_try_init(|| async {
                let mut options = InitOptions::new(self.model.clone())
                    .with_show_download_progress(self.show_download_progress);
                if let Some(dir) = &self.cache_dir {
                    options = options.with_cache_dir(dir.clone());
                }

                let name = self.name.clone();
                let loaded = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
                    .await
                    .map_err(|e| {
                        MemoryError::Initialization(format!("Model loader task failed: {e}"))
                    })?
                    .map_err(|e| {
                        MemoryError::Initialization(format!(
                            "Failed to load embedding model {name}: {e}"
                        ))
                    })?;

                tracing::info!(model = %self.name, "Embedding model loaded");
                Ok::<_, MemoryError>(Arc::new(Mutex::new(loaded)))
            })
            .await?;
        Ok(Arc::clone(model))
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.model().await?;
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| MemoryError::Embedding(format!("Failed to acquire model lock: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| MemoryError::Embedding(format!("Failed to generate embedding: {e}")))
        })
        .await
        .map_err(|e| MemoryError::Embedding(format!("Embedding task failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.iter().map(|t| t.to_string()).collect())
            .await
    }
}
