//! Error types for the ManabiFun core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the quiz engine, the data files and the analytics layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Excel(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A data file that must exist was not found.
    #[error("data file not found: {}", .0.display())]
    MissingData(PathBuf),

    /// A data file exists but holds no usable rows.
    #[error("data file is empty: {}", .0.display())]
    EmptyData(PathBuf),

    /// Input rejected before it reached the engine or a classifier.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A model artifact is malformed or does not match its classifier.
    #[error("model error: {0}")]
    Model(String),
}

impl Error {
    /// Returns `true` for the missing/empty data conditions the UI reports
    /// with a friendly message instead of an error page.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Error::MissingData(_) | Error::EmptyData(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
