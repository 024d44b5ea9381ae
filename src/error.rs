//! Error types for caudal operations.
//!
//! Provides rich error context for library consumers.

use std::fmt;

/// Main error type for caudal operations.
///
/// Covers configuration conflicts detected before training, model-format
/// problems found while loading a persisted regressor, and plain I/O
/// failures. Address wraparound from masking is defined behavior and is
/// never reported through this type.
///
/// # Examples
///
/// ```
/// use caudal::error::CaudalError;
///
/// let err = CaudalError::ConfigConflict {
///     message: "skips require ngram".to_string(),
/// };
/// assert!(err.to_string().contains("skips require ngram"));
/// ```
#[derive(Debug)]
pub enum CaudalError {
    /// Mutually exclusive or incomplete configuration; training never starts.
    ConfigConflict {
        /// Description of the conflicting options
        message: String,
    },

    /// Invalid hyperparameter value provided.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Invalid or corrupt model file.
    FormatError {
        /// Error description
        message: String,
    },

    /// Model file written by an unsupported format version.
    UnsupportedVersion {
        /// Version found in the file
        found: u32,
        /// Maximum version this build reads
        supported: u32,
    },

    /// Model checksum verification failed.
    ChecksumMismatch {
        /// Expected checksum
        expected: u32,
        /// Actual checksum
        actual: u32,
    },

    /// Persisted table geometry differs from the running configuration.
    GeometryMismatch {
        /// Description of the mismatched field
        field: String,
        /// Value in the model file
        model: u32,
        /// Value in the current configuration
        current: u32,
    },

    /// I/O error (file not found, permission denied, etc.).
    Io(std::io::Error),

    /// Serialization/deserialization error.
    Serialization(String),

    /// Generic error with string message.
    Other(String),
}

impl fmt::Display for CaudalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaudalError::ConfigConflict { message } => {
                write!(f, "Configuration conflict: {message}")
            }
            CaudalError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid hyperparameter: {param} = {value}, expected {constraint}"
                )
            }
            CaudalError::FormatError { message } => {
                write!(f, "Invalid model format: {message}")
            }
            CaudalError::UnsupportedVersion { found, supported } => {
                write!(
                    f,
                    "Unsupported model version: found {found}, max supported {supported}"
                )
            }
            CaudalError::ChecksumMismatch { expected, actual } => {
                write!(
                    f,
                    "Checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}"
                )
            }
            CaudalError::GeometryMismatch {
                field,
                model,
                current,
            } => {
                write!(
                    f,
                    "Model geometry mismatch: {field} is {model} in the model but {current} here"
                )
            }
            CaudalError::Io(e) => write!(f, "I/O error: {e}"),
            CaudalError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            CaudalError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CaudalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaudalError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaudalError {
    fn from(err: std::io::Error) -> Self {
        CaudalError::Io(err)
    }
}

impl From<&str> for CaudalError {
    fn from(msg: &str) -> Self {
        CaudalError::Other(msg.to_string())
    }
}

impl From<String> for CaudalError {
    fn from(msg: String) -> Self {
        CaudalError::Other(msg)
    }
}

impl CaudalError {
    /// Create a configuration-conflict error.
    #[must_use]
    pub fn conflict(message: &str) -> Self {
        Self::ConfigConflict {
            message: message.to_string(),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, CaudalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_conflict_display() {
        let err = CaudalError::conflict("you can not skip unless ngram is > 1");
        assert!(err.to_string().contains("Configuration conflict"));
        assert!(err.to_string().contains("ngram"));
    }

    #[test]
    fn test_invalid_hyperparameter_display() {
        let err = CaudalError::InvalidHyperparameter {
            param: "num_bits".to_string(),
            value: "40".to_string(),
            constraint: "1..=31".to_string(),
        };
        assert!(err.to_string().contains("num_bits"));
        assert!(err.to_string().contains("40"));
        assert!(err.to_string().contains("1..=31"));
    }

    #[test]
    fn test_geometry_mismatch_display() {
        let err = CaudalError::GeometryMismatch {
            field: "num_bits".to_string(),
            model: 20,
            current: 18,
        };
        let msg = err.to_string();
        assert!(msg.contains("num_bits"));
        assert!(msg.contains("20"));
        assert!(msg.contains("18"));
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = CaudalError::ChecksumMismatch {
            expected: 0xDEADBEEF,
            actual: 0xCAFEBABE,
        };
        assert!(err.to_string().contains("Checksum"));
        assert!(err.to_string().contains("DEADBEEF"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CaudalError = io_err.into();
        assert!(matches!(err, CaudalError::Io(_)));
    }

    #[test]
    fn test_from_str() {
        let err: CaudalError = "test error".into();
        assert!(matches!(err, CaudalError::Other(_)));
        assert_eq!(err.to_string(), "test error");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;
        let err = CaudalError::Io(std::io::Error::other("x"));
        assert!(err.source().is_some());
        let err = CaudalError::Other("x".to_string());
        assert!(err.source().is_none());
    }
}
