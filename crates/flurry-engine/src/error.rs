//! Error types for the engine.
//!
//! Only configuration problems are errors. Real-time shortfalls (a stretch
//! bed that is not ready yet) are resolved by substituting silence and never
//! surface here.

use flurry_params::ParamError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while constructing engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A scale family table is malformed.
    #[error("invalid scale table: {message}")]
    ScaleTable {
        /// What is wrong with the table.
        message: String,
    },

    /// Selection weights sum to zero, so weighted selection is impossible.
    #[error("scale selection weights sum to zero")]
    ZeroSelectionWeight,

    /// Unknown reverb topology name.
    #[error("unknown reverb preset '{name}' (expected plate, hall, cathedral or dark_hall)")]
    UnknownReverbPreset {
        /// The rejected name.
        name: String,
    },

    /// Engine configuration is invalid.
    #[error("invalid engine config '{field}': {message}")]
    InvalidConfig {
        /// Offending field.
        field: String,
        /// Error message.
        message: String,
    },

    /// Parameter state problem.
    #[error(transparent)]
    Params(#[from] ParamError),

    /// The stretch worker thread could not be started.
    #[error("failed to start stretch worker: {0}")]
    Worker(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a scale table error.
    pub fn scale_table(message: impl Into<String>) -> Self {
        Self::ScaleTable {
            message: message.into(),
        }
    }

    /// Creates an invalid config error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns a stable error code for diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ScaleTable { .. } => "ENGINE_001",
            EngineError::ZeroSelectionWeight => "ENGINE_002",
            EngineError::UnknownReverbPreset { .. } => "ENGINE_003",
            EngineError::InvalidConfig { .. } => "ENGINE_004",
            EngineError::Params(_) => "ENGINE_005",
            EngineError::Worker(_) => "ENGINE_006",
        }
    }

    /// Returns the error category.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::ScaleTable { .. }
            | EngineError::ZeroSelectionWeight
            | EngineError::UnknownReverbPreset { .. }
            | EngineError::InvalidConfig { .. } => "configuration",
            EngineError::Params(_) => "parameters",
            EngineError::Worker(_) => "runtime",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_table_helper() {
        let err = EngineError::scale_table("family 'x' has no intervals");
        assert!(err.to_string().contains("no intervals"));
        assert_eq!(err.code(), "ENGINE_001");
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_unknown_preset_message() {
        let err = EngineError::UnknownReverbPreset {
            name: "bathroom".to_string(),
        };
        assert!(err.to_string().contains("bathroom"));
    }
}
