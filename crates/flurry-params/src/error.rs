//! Error types for parameter handling.

use thiserror::Error;

/// Result type for parameter operations.
pub type ParamResult<T> = Result<T, ParamError>;

/// Errors that can occur while loading, validating or addressing parameters.
#[derive(Debug, Error)]
pub enum ParamError {
    /// No parameter with this name exists.
    #[error("unknown parameter '{name}'")]
    UnknownParameter {
        /// The requested name.
        name: String,
    },

    /// Value lies outside the documented range.
    #[error("parameter '{name}' out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// Value is NaN or infinite.
    #[error("parameter '{name}' is not a finite number")]
    NotFinite {
        /// Parameter name.
        name: &'static str,
    },

    /// A time bucket string could not be parsed.
    #[error("invalid time bucket '{bucket}': {message}")]
    InvalidBucket {
        /// The rejected bucket string.
        bucket: String,
        /// Why it was rejected.
        message: String,
    },

    /// Unknown bucket granularity name.
    #[error("invalid bucket granularity '{0}' (expected 'hour' or 'day')")]
    InvalidGranularity(String),

    /// Preset JSON could not be parsed.
    #[error("invalid parameter JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParamError {
    /// Returns a stable error code for diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            ParamError::UnknownParameter { .. } => "PARAM_001",
            ParamError::OutOfRange { .. } => "PARAM_002",
            ParamError::NotFinite { .. } => "PARAM_003",
            ParamError::InvalidBucket { .. } => "PARAM_004",
            ParamError::InvalidGranularity(_) => "PARAM_005",
            ParamError::Json(_) => "PARAM_006",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message() {
        let err = ParamError::OutOfRange {
            name: "tension",
            value: 1.5,
            min: 0.0,
            max: 1.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("tension"));
        assert!(msg.contains("1.5"));
        assert_eq!(err.code(), "PARAM_002");
    }

    #[test]
    fn test_unknown_parameter_message() {
        let err = ParamError::UnknownParameter {
            name: "wobble".to_string(),
        };
        assert!(err.to_string().contains("wobble"));
    }
}
