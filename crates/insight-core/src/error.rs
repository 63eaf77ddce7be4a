use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    /// A record the protocol guarantees to exist was missing.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type InsightResult<T> = Result<T, InsightError>;
