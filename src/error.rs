//! Error types for cassa.

use thiserror::Error;

/// Opaque failure surfaced by an executor. Never interpreted, only passed through.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for cassa operations.
#[derive(Debug, Error)]
pub enum CassaError {
    /// Failed to parse statement text, a type, or a duration.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Preflight failure. Nothing was dispatched.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request does not fit the table layout. Nothing was dispatched.
    #[error("Generation error: {0}")]
    Generation(String),

    /// A statement failed during sequential execution.
    /// The first `applied` statements already took effect.
    #[error("Execution error after {applied} applied statement(s) while running `{statement}`: {source}")]
    Execution {
        applied: usize,
        statement: String,
        #[source]
        source: BoxError,
    },

    /// An atomic batch failed as a whole.
    #[error("Batch of {statements} statement(s) failed: {source}")]
    Batch {
        statements: usize,
        #[source]
        source: BoxError,
    },

    /// Cancellation or deadline hit before (or between) dispatches.
    #[error("Cancelled after {applied} applied statement(s)")]
    Cancelled { applied: usize },

    /// A single row was requested but none came back.
    #[error("Row not found in table '{table}'")]
    RowNotFound { table: String },

    /// Row codec failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a failed call may have left behind in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing happened.
    None,
    /// Some statements may have been applied.
    Partial,
    /// Either the whole batch applied or none of it did.
    AllOrNothing,
}

impl CassaError {
    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Classify the side effects this error implies.
    pub fn effect(&self) -> Effect {
        match self {
            Self::Execution { .. } => Effect::Partial,
            Self::Cancelled { applied } if *applied > 0 => Effect::Partial,
            Self::Batch { .. } => Effect::AllOrNothing,
            _ => Effect::None,
        }
    }
}

impl From<serde_json::Error> for CassaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Result type alias for cassa operations.
pub type CassaResult<T> = Result<T, CassaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CassaError::validation("missing key field 'id'");
        assert_eq!(err.to_string(), "Validation error: missing key field 'id'");
    }

    #[test]
    fn test_parse_error_display() {
        let err = CassaError::parse(5, "unexpected character");
        assert_eq!(err.to_string(), "Parse error at position 5: unexpected character");
    }

    #[test]
    fn test_effect_classification() {
        assert_eq!(CassaError::generation("x").effect(), Effect::None);
        assert_eq!(CassaError::Cancelled { applied: 0 }.effect(), Effect::None);
        assert_eq!(CassaError::Cancelled { applied: 2 }.effect(), Effect::Partial);

        let exec = CassaError::Execution {
            applied: 1,
            statement: "DELETE FROM t".into(),
            source: "boom".into(),
        };
        assert_eq!(exec.effect(), Effect::Partial);

        let batch = CassaError::Batch {
            statements: 2,
            source: "boom".into(),
        };
        assert_eq!(batch.effect(), Effect::AllOrNothing);
    }
}
