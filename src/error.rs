use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Session file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Malformed session file {}: {reason}", path.display())]
    FileFormat { path: PathBuf, reason: String },

    #[error("Not enough data in {session}: need {required} samples, have {available}")]
    InsufficientData {
        session: String,
        required: usize,
        available: usize,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No session files found under {}", root.display())]
    NoSessions { root: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeMismatch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
