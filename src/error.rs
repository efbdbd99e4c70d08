//! Error types for volume conversion

use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the conversion entry points.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Slice assembly found nothing it could sort.
    #[error("No valid slices with positional information found")]
    NoValidSlices,

    /// A single input file could not be parsed.
    #[error("Unreadable source {id}: {reason}")]
    UnreadableSource { id: String, reason: String },

    /// A conversion needed a reference metadata record that does not exist.
    #[error("Reference metadata not found: {}", .0.display())]
    MissingReference(PathBuf),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl ConversionError {
    pub(crate) fn unreadable(id: impl Into<String>, reason: impl ToString) -> Self {
        ConversionError::UnreadableSource {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn failed(reason: impl ToString) -> Self {
        ConversionError::ConversionFailed(reason.to_string())
    }
}

/// Specialized Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConversionError>;
