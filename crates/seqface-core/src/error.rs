use thiserror::Error;

/// Top-level error type for the seqface ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("storage unavailable for {location}: {reason}")]
    StorageUnavailable { location: String, reason: String },

    #[error("image decode error: {0}")]
    Decode(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("detection failed: {0}")]
    Detection(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn storage(location: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::StorageUnavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
