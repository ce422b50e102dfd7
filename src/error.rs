//! Error types for Rabbithole.

use std::time::Duration;
use thiserror::Error;

/// Library-level error type for Rabbithole operations.
#[derive(Error, Debug)]
pub enum RabbitholeError {
    #[error("Unsupported media kind: {0}")]
    UnsupportedMediaKind(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Vector search service error: {0}")]
    SearchService(String),

    #[error("Summarization service error: {0}")]
    SummarizationService(String),

    #[error("Transcription service error: {0}")]
    TranscriptionService(String),

    #[error("{service} call timed out after {}s", timeout.as_secs_f64())]
    ServiceTimeout {
        service: &'static str,
        timeout: Duration,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Plan generation failed: {0}")]
    Planner(String),

    #[error("Reference index error: {0}")]
    ReferenceIndex(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Pipeline job for '{0}' panicked")]
    JobPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}

/// Coarse classification of a [`RabbitholeError`], stable enough to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedMediaKind,
    InvalidInput,
    TranscriptionFailed,
    EmbeddingServiceError,
    SearchServiceError,
    SummarizationServiceError,
    TranscriptionServiceError,
    ServiceTimeout,
    Extraction,
    Configuration,
    Internal,
}

impl ErrorKind {
    /// Whether a failed external call of this kind may succeed if repeated.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::ServiceTimeout
                | ErrorKind::EmbeddingServiceError
                | ErrorKind::SearchServiceError
                | ErrorKind::SummarizationServiceError
                | ErrorKind::TranscriptionServiceError
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedMediaKind => "unsupported media kind",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::TranscriptionFailed => "transcription failed",
            ErrorKind::EmbeddingServiceError => "embedding service error",
            ErrorKind::SearchServiceError => "search service error",
            ErrorKind::SummarizationServiceError => "summarization service error",
            ErrorKind::TranscriptionServiceError => "transcription service error",
            ErrorKind::ServiceTimeout => "service timeout",
            ErrorKind::Extraction => "extraction error",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

impl RabbitholeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RabbitholeError::UnsupportedMediaKind(_) => ErrorKind::UnsupportedMediaKind,
            RabbitholeError::InvalidInput(_) => ErrorKind::InvalidInput,
            RabbitholeError::TranscriptionFailed(_) => ErrorKind::TranscriptionFailed,
            RabbitholeError::EmbeddingService(_) => ErrorKind::EmbeddingServiceError,
            RabbitholeError::SearchService(_) | RabbitholeError::ReferenceIndex(_) => {
                ErrorKind::SearchServiceError
            }
            RabbitholeError::SummarizationService(_) | RabbitholeError::Planner(_) => {
                ErrorKind::SummarizationServiceError
            }
            RabbitholeError::TranscriptionService(_) => ErrorKind::TranscriptionServiceError,
            RabbitholeError::ServiceTimeout { .. } => ErrorKind::ServiceTimeout,
            RabbitholeError::Extraction(_)
            | RabbitholeError::ToolNotFound(_)
            | RabbitholeError::ToolFailed(_)
            | RabbitholeError::Wav(_) => ErrorKind::Extraction,
            RabbitholeError::Config(_) | RabbitholeError::TomlParse(_) => ErrorKind::Configuration,
            RabbitholeError::JobPanicked(_)
            | RabbitholeError::Io(_)
            | RabbitholeError::Json(_)
            | RabbitholeError::Http(_)
            | RabbitholeError::Database(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for Rabbithole operations.
pub type Result<T> = std::result::Result<T, RabbitholeError>;
