//! Error types for lavavu-core
//!
//! Provides error handling for:
//! - Property and identifier validation
//! - Array conversion
//! - Backend runtime failures
//! - Render bridge and session lifecycle

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for lavavu operations
#[derive(Error, Debug)]
pub enum LavaVuError {
    /// Validation errors, raised to the caller immediately
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Array conversion errors
    #[error("Conversion failed: {0}")]
    Convert(#[from] ConvertError),

    /// Errors reported by the rendering backend
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Render bridge errors
    #[error("Render bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when validating names, identifiers and arguments
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Property name is not in the schema
    #[error("Unknown property: {name}")]
    UnknownProperty { name: String },

    /// Renderer is not one of the known geometry types
    #[error("Invalid renderer type: {name}")]
    InvalidRenderer { name: String },

    /// Filter index out of range
    #[error("Filter index {index} out of range ({count} filters)")]
    InvalidFilterIndex { index: usize, count: usize },

    /// Object identifier did not resolve
    #[error("Invalid object identifier: {ident}")]
    InvalidIdentifier { ident: String },

    /// Data role or label is not writable or not known
    #[error("Unknown data role: {role}")]
    UnknownRole { role: String },

    /// A different colour map already uses this name
    #[error("Colour map name conflict: {name}")]
    ColourMapConflict { name: String },

    /// Colour string could not be parsed
    #[error("Invalid colour: {value}")]
    InvalidColour { value: String },

    /// Scripting command is not published by the backend
    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    /// Generic argument error
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

/// Errors raised while coercing caller data into canonical arrays
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    /// Input could not be interpreted as numbers
    #[error("Value is not numeric: {value}")]
    NotNumeric { value: String },

    /// Nested lists of differing lengths
    #[error("Ragged nested list: expected {expected} entries, got {actual}")]
    Ragged { expected: usize, actual: usize },

    /// Final shape does not fit the role
    #[error("Shape {shape:?} does not match role {role} (width {width})")]
    ShapeMismatch {
        shape: Vec<usize>,
        role: String,
        width: usize,
    },

    /// Element type cannot be converted to the target
    #[error("Incompatible dtype: cannot convert {from} to {to}")]
    IncompatibleDtype { from: String, to: String },
}

/// Errors reported by a rendering backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Startup failed
    #[error("Initialisation failed: {message}")]
    Init { message: String },

    /// File load failed
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// No object with this handle or name
    #[error("Object not found: {name}")]
    MissingObject { name: String },

    /// No geometry element with this handle
    #[error("Geometry element not found: {id}")]
    MissingElement { id: u64 },

    /// File type not handled
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Operation not available in this backend
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    /// Script line could not be executed
    #[error("Script error in '{line}': {message}")]
    Script { line: String, message: String },

    /// Image encode or decode failure
    #[error("Image error: {message}")]
    Image { message: String },

    /// Underlying I/O failure, stored as text so the error stays cloneable
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io {
            message: err.to_string(),
        }
    }
}

/// Errors from the render bridge
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Bridge shut down while a caller was waiting
    #[error("Render bridge closed")]
    Closed,

    /// The render thread panicked while running a work item
    #[error("Render thread panicked while running {method}")]
    Panicked { method: String },

    /// Thread could not be spawned
    #[error("Failed to start render thread: {message}")]
    Spawn { message: String },
}

/// Errors related to the session and its handles
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Handle outlived its session, or the session was reset
    #[error("Handle is defunct: {name}")]
    Defunct { name: String },

    /// Session already closed
    #[error("Session is closed")]
    Closed,

    /// Image comparisons exceeded tolerance
    #[error("Image tests failed: {failed:?}")]
    ImageTestFailed { failed: Vec<String> },

    /// Image to compare was not produced
    #[error("Image not found: {path}")]
    ImageMissing { path: PathBuf },

    /// External encoder failed
    #[error("Video encoding failed: {message}")]
    Video { message: String },
}

/// Result type alias for lavavu operations
pub type LavaVuResult<T> = Result<T, LavaVuError>;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for conversion
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Result type alias for validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation helpers
pub mod validation {
    use super::ValidationError;

    /// Validate that a name is usable as an object or colour map identifier
    pub fn validate_name(name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::InvalidIdentifier {
                ident: name.to_string(),
            });
        }
        if name.contains(['\n', ';', '\r']) {
            return Err(ValidationError::InvalidIdentifier {
                ident: name.to_string(),
            });
        }
        Ok(())
    }

    /// Validate a requested output resolution
    pub fn validate_resolution(width: u32, height: u32) -> Result<(), ValidationError> {
        const MAX_DIMENSION: u32 = 16384;
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ValidationError::InvalidArgument {
                message: format!(
                    "resolution {}x{} exceeds {} pixels",
                    width, height, MAX_DIMENSION
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::validation::*;
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("points").is_ok());
        assert!(validate_name("my object").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("a;b").is_err());
    }

    #[test]
    fn test_validate_resolution() {
        assert!(validate_resolution(0, 0).is_ok());
        assert!(validate_resolution(640, 480).is_ok());
        assert!(validate_resolution(20000, 10).is_err());
    }

    #[test]
    fn test_error_conversion() {
        let err: LavaVuError = ValidationError::UnknownProperty {
            name: "bogus".into(),
        }
        .into();
        assert!(err.to_string().contains("bogus"));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let backend: BackendError = io.into();
        assert!(matches!(backend, BackendError::Io { .. }));
    }
}
