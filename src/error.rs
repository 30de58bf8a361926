use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid session code: {0}")]
    InvalidSessionCode(String),

    #[error("invalid paper id: {0}")]
    InvalidPaperId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned only {bytes} bytes, not a usable file")]
    TooSmall { url: String, bytes: u64 },

    #[error("{url} returned {content_type}, not a PDF")]
    NotPdf { url: String, content_type: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl HarvestError {
    /// Errors that belong to a single page, row or file. The pipeline records
    /// them and moves on; anything else aborts the run.
    pub fn is_item_failure(&self) -> bool {
        matches!(
            self,
            HarvestError::Http { .. }
                | HarvestError::Status { .. }
                | HarvestError::TooSmall { .. }
                | HarvestError::NotPdf { .. }
                | HarvestError::Parse(_)
                | HarvestError::InvalidSessionCode(_)
                | HarvestError::InvalidPaperId(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            HarvestError::Http { .. } => true,
            HarvestError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
