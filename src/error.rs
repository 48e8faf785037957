use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WorkshopError {
    #[error("invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("catalog request failed: {0}")]
    Http(String),

    #[error("catalog returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed catalog response: {0}")]
    Parse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("destination folder unavailable: {0}")]
    Folder(String),

    #[error("archive extraction failed: {0}")]
    Extraction(String),

    #[error("no map file found under {0}")]
    PayloadNotFound(PathBuf),

    #[error("a download is already in progress")]
    Busy,

    #[error("no search result at index {0}")]
    InvalidIndex(usize),

    #[error("no downloadable release for {0}")]
    NoRelease(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Parse,
    Filesystem,
    Extraction,
    Busy,
    Usage,
}

impl WorkshopError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkshopError::Http(_) | WorkshopError::Status { .. } => ErrorCategory::Transport,
            WorkshopError::Parse(_) => ErrorCategory::Parse,
            WorkshopError::Filesystem(_) | WorkshopError::Folder(_) => ErrorCategory::Filesystem,
            WorkshopError::Extraction(_)
            | WorkshopError::PayloadNotFound(_)
            | WorkshopError::Cancelled => ErrorCategory::Extraction,
            WorkshopError::Busy => ErrorCategory::Busy,
            WorkshopError::InvalidProjectId(_)
            | WorkshopError::InvalidIndex(_)
            | WorkshopError::NoRelease(_)
            | WorkshopError::ConfigRead(_)
            | WorkshopError::ConfigParse(_) => ErrorCategory::Usage,
        }
    }
}
