//! Error types for PdfSage.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The requested document does not resolve to a readable file.
    #[error("PDF file not found: {0}")]
    NotFound(String),

    /// Extraction failed or produced no usable text.
    #[error("Unreadable PDF: {0}")]
    UnreadableDocument(String),

    /// The chat call could not be started.
    #[error("Ollama error: {0}")]
    BackendUnavailable(String),

    /// The backend stream failed after it had started.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request body could not be decoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
