//! Shared Error Types
//!
//! Errors raised while parsing or validating the shared data model. Storage
//! and transmission have their own error types next to the code that raises
//! them; this module only covers the types in `shared`.
//!
//! # Error Categories
//!
//! - `ValidationError` - a field held a value outside its domain
//! - `UnknownMutationType` - a type name with no matching `MutationType`
//!
//! # Usage
//!
//! ```rust
//! use propsync::shared::error::SharedError;
//!
//! let error = SharedError::validation("sync_status", "unknown sync status 'done'");
//! assert!(error.to_string().contains("sync_status"));
//! ```
use thiserror::Error;

/// Errors on shared data model types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// Type name that does not map to any known mutation type
    #[error("Unknown mutation type '{name}'")]
    UnknownMutationType {
        /// The unrecognised type name
        name: String,
    },
}

impl SharedError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new unknown mutation type error
    pub fn unknown_mutation_type(name: impl Into<String>) -> Self {
        Self::UnknownMutationType { name: name.into() }
    }
}
