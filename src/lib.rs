//! Weighted multi-field semantic search over stored resume embeddings.
//!
//! Each resume field (summary, skills, work history, projects, education) is
//! embedded separately. A query is matched against every field, the per-field
//! relevance is weighted and summed per candidate, and candidates come back
//! ranked with a breakdown of what contributed.

pub mod config;
pub mod embedder;
pub mod error;
pub mod models;
pub mod normalize;
pub mod search;
pub mod store;

pub use config::{Config, FailurePolicy, SearchConfig};
pub use embedder::{Embedder, FastEmbedder, ModelName};
pub use error::{Result, SearchError};
pub use models::{
    CandidateRecord, CompositeKey, Field, FieldMatch, FieldScore, FieldWeights, RankedResult,
    SearchHit, SearchResponse,
};
pub use normalize::Normalizer;
pub use search::SearchEngine;
pub use store::{FieldStore, SurrealFieldStore};
