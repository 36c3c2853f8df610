//! Separation error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing or running a separation job
#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// A requested stem is not part of the model's vocabulary
    #[error("Stem '{stem}' is not produced by model '{model}'")]
    StemNotFound { stem: String, model: String },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Failed to read audio file: {path}: {source}")]
    AudioReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode audio: {0}")]
    DecodeFailed(String),

    #[error("Backend initialization failed: {0}")]
    BackendInitFailed(String),

    #[error("Separation failed: {0}")]
    InferenceFailed(String),

    #[error("Model download failed: {0}")]
    ModelDownloadFailed(String),

    /// Weights for a catalog model are neither cached nor downloadable
    #[error("Model weights unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Failed to write stem file: {path}: {source}")]
    StemWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline already started")]
    AlreadyStarted,

    /// A provider or model panicked while the job was running
    #[error("Separation worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SeparationError>;
