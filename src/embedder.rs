use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SearchError};

/// Turns text into dense vectors. Implementations must be deterministic for a
/// given input so repeated searches rank identically.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding("embedder returned no vectors".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelName {
    #[default]
    #[serde(rename = "all-minilm-l6-v2")]
    AllMiniLmL6V2,
    #[serde(rename = "bge-small-en-v1.5")]
    BgeSmallEnV15,
    #[serde(rename = "bge-base-en-v1.5")]
    BgeBaseEnV15,
}

impl ModelName {
    fn model(self) -> EmbeddingModel {
        match self {
            ModelName::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
            ModelName::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
            ModelName::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
        }
    }
}

/// Local ONNX embeddings via fastembed.
pub struct FastEmbedder {
    model: TextEmbedding,
}

impl FastEmbedder {
    pub fn new(name: ModelName, show_download_progress: bool) -> Result<Self> {
        info!(model = ?name, "loading embedding model");
        let model = TextEmbedding::try_new(
            InitOptions::new(name.model()).with_show_download_progress(show_download_progress),
        )
        .map_err(|e| SearchError::Embedding(e.to_string()))?;
        Ok(Self { model })
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let count = texts.len();
        let embeddings = self
            .model
            .embed(texts, None)
            .map_err(|e| SearchError::Embedding(e.to_string()))?;
        debug!(count, dims = embeddings.first().map_or(0, Vec::len), "embedded texts");
        Ok(embeddings)
    }
}

/// Bag-of-words hashing embedder for tests: texts sharing words are close,
/// texts with disjoint vocabularies are orthogonal.
#[cfg(test)]
pub(crate) struct HashingEmbedder;

#[cfg(test)]
impl Embedder for HashingEmbedder {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        const DIMS: usize = 256;
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; DIMS];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let mut hasher = DefaultHasher::new();
                    word.to_lowercase().hash(&mut hasher);
                    vector[(hasher.finish() as usize) % DIMS] += 1.0;
                }
                vector
            })
            .collect())
    }
}
