//! Error types for Part 21 parsing and writing.

use thiserror::Error;

/// Errors that can occur while reading or writing Part 21 text.
#[derive(Error, Debug)]
pub enum StepError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed exchange structure: bad skeleton, bad instance syntax, or
    /// a malformed token.
    #[error("Format error at line {line}, column {col}: {message}")]
    Format {
        /// Line number (1-indexed).
        line: usize,
        /// Column number (1-indexed).
        col: usize,
        /// Error message.
        message: String,
    },

    /// Parameter list could not be decoded into values.
    #[error("Parameter error{}: {message}", entity_id.map(|id| format!(" at entity #{}", id)).unwrap_or_default())]
    Parser {
        /// Entity ID where the error occurred, if known.
        entity_id: Option<u64>,
        /// Error message.
        message: String,
    },

    /// Missing entity reference.
    #[error("Missing entity reference: #{0}")]
    MissingEntity(u64),

    /// Type mismatch (e.g., expected PRODUCT but got PRODUCT_CONTEXT).
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: String,
        /// Actual type name.
        actual: String,
    },
}

impl StepError {
    /// Create a format error.
    pub fn format(line: usize, col: usize, message: impl Into<String>) -> Self {
        Self::Format {
            line,
            col,
            message: message.into(),
        }
    }

    /// Create a parameter decoding error.
    pub fn parser(entity_id: Option<u64>, message: impl Into<String>) -> Self {
        Self::Parser {
            entity_id,
            message: message.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Attach an entity id to a parameter error that does not carry one yet.
    pub fn at_entity(self, id: u64) -> Self {
        match self {
            Self::Parser {
                entity_id: None,
                message,
            } => Self::Parser {
                entity_id: Some(id),
                message,
            },
            other => other,
        }
    }

    /// Returns `true` if this error describes malformed text (as opposed
    /// to an I/O failure).
    pub fn is_format(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
