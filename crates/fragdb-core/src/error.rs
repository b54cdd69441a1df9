use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Persistence failed: {0}")]
    Persist(String),

    #[error("Unknown fragment kind: {0}")]
    UnknownKind(String),
}

pub type Result<T> = std::result::Result<T, Error>;
