//! Error handling for fxcore
//!
//! Out-of-range numbers are never errors: every setter clamps. The variants
//! here cover lifecycle misuse, unusable captures, unknown selectors and the
//! I/O layer.

use thiserror::Error;

/// Result type alias for fxcore operations
pub type Result<T> = std::result::Result<T, FxError>;

/// Main error type for fxcore operations
#[derive(Error, Debug)]
pub enum FxError {
    // Lifecycle Errors
    #[error("{component} is not initialized")]
    NotInitialized { component: &'static str },

    #[error("{component} has been disposed")]
    Disposed { component: String },

    // Capture Errors
    #[error("Capture failed: {reason}")]
    CaptureFailed { reason: String },

    // Dispatch Errors
    #[error("Unknown {kind}: {name}")]
    UnknownSelector { kind: &'static str, name: String },

    #[error("Invalid parameter {param}: got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Audio Errors
    #[error("Invalid audio: {reason}")]
    InvalidAudio { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FxError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::NotInitialized { .. } => "NOT_INITIALIZED",
            FxError::Disposed { .. } => "DISPOSED",
            FxError::CaptureFailed { .. } => "CAPTURE_FAILED",
            FxError::UnknownSelector { .. } => "UNKNOWN_SELECTOR",
            FxError::InvalidParameter { .. } => "INVALID_PARAMETER",
            FxError::InvalidAudio { .. } => "INVALID_AUDIO",
            FxError::Io(_) => "IO_ERROR",
            FxError::Wav(_) => "WAV_ERROR",
            FxError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable without caller intervention
    ///
    /// Lifecycle misuse is a programming bug upstream and is never recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FxError::CaptureFailed { .. }
                | FxError::UnknownSelector { .. }
                | FxError::InvalidParameter { .. }
        )
    }

    /// Shorthand for a non-numeric parameter value
    pub(crate) fn expected_number(param: &str, value: &serde_json::Value) -> Self {
        FxError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: "number".to_string(),
        }
    }
}
