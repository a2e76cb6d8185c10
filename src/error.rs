use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Invalid weight {weight} for field {field}")]
    InvalidWeight { field: String, weight: f32 },
    #[error("Invalid candidate record: {0}")]
    InvalidRecord(String),
    #[error("Limit must be at least 1")]
    InvalidLimit,
    #[error("No stored fields for candidate: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] surrealdb::Error),
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
