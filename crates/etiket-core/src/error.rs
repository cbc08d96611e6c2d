use thiserror::Error;

/// Errors that can occur across etiket operations.
#[derive(Debug, Error)]
pub enum EtiketError {
    /// A required CLI argument, parameter, or artifact file is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The corpus or a persisted dictionary is malformed or unreadable.
    #[error("data error: {0}")]
    Data(String),

    /// A single hyperparameter trial failed. Isolated by the search loop,
    /// recorded as a failed trial, never fatal for the process.
    #[error("trial failed: {0}")]
    Trial(String),

    /// A checkpoint or params file is inconsistent with the requested phase.
    #[error("resume mismatch: {0}")]
    ResumeMismatch(String),

    /// Underlying I/O failure while reading or writing an artifact.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted artifact could not be (de)serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for etiket operations.
pub type Result<T> = std::result::Result<T, EtiketError>;
