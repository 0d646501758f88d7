//! Error types for fMRI QA metric computation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for QA operations
pub type QaResult<T> = Result<T, QaError>;

/// Errors raised while computing QA metrics for one acquisition
#[derive(Error, Debug)]
pub enum QaError {
    /// Mask or noise reference does not match the volume's spatial dimensions
    #[error("{what} shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    /// Too few time points, or intensities that make statistics undefined
    #[error("Degenerate volume: {0}")]
    DegenerateVolume(String),

    /// A masked reduction selected zero voxels
    #[error("No valid voxels: {0}")]
    NoValidVoxels(String),

    /// No informative voxels to derive a noise level from
    #[error("Undefined noise level: {0}")]
    UndefinedNoiseLevel(String),

    /// Malformed caller input (buffer length, ROI bounds, parameters)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or writing a NIfTI container failed
    #[error("NIfTI error: {0}")]
    Nifti(String),

    /// JSON sidecar could not be parsed
    #[error("Sidecar error: {0}")]
    Sidecar(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Stable, serializable classification of a [`QaError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaErrorKind {
    ShapeMismatch,
    DegenerateVolume,
    NoValidVoxels,
    UndefinedNoiseLevel,
    InvalidInput,
    Io,
    Nifti,
    Sidecar,
    Config,
}

impl QaError {
    pub fn kind(&self) -> QaErrorKind {
        match self {
            QaError::ShapeMismatch { .. } => QaErrorKind::ShapeMismatch,
            QaError::DegenerateVolume(_) => QaErrorKind::DegenerateVolume,
            QaError::NoValidVoxels(_) => QaErrorKind::NoValidVoxels,
            QaError::UndefinedNoiseLevel(_) => QaErrorKind::UndefinedNoiseLevel,
            QaError::InvalidInput(_) => QaErrorKind::InvalidInput,
            QaError::Io(_) => QaErrorKind::Io,
            QaError::Nifti(_) => QaErrorKind::Nifti,
            QaError::Sidecar(_) => QaErrorKind::Sidecar,
            QaError::Config(_) => QaErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = QaError::NoValidVoxels("empty mask".into());
        assert_eq!(err.kind(), QaErrorKind::NoValidVoxels);

        let err = QaError::Sidecar("bad json".into());
        assert_eq!(err.kind(), QaErrorKind::Sidecar);
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = QaError::ShapeMismatch {
            what: "brain mask",
            expected: (4, 4, 2),
            actual: (4, 4, 3),
        };
        let msg = err.to_string();
        assert!(msg.contains("brain mask"));
        assert!(msg.contains("(4, 4, 2)"));
        assert!(msg.contains("(4, 4, 3)"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&QaErrorKind::UndefinedNoiseLevel).unwrap();
        assert_eq!(json, "\"undefined_noise_level\"");
    }
}
