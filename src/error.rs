use thiserror::Error;

/// Result type for deepq operations
pub type Result<T> = std::result::Result<T, DqnError>;

/// Main error type for the deepq library
#[derive(Error, Debug)]
pub enum DqnError {
    /// Missing or invalid hyperparameter
    #[error("Configuration error in '{name}': {reason}")]
    Configuration {
        name: String,
        reason: String,
    },

    /// Not enough transitions stored to draw the requested batch
    #[error("Insufficient data: requested {requested} transitions, only {available} stored")]
    InsufficientData {
        requested: usize,
        available: usize,
    },

    /// Checkpoint dimensions do not match the live agent
    #[error("Incompatible state: provided parameter {name} = {provided} is inconsistent with agent parameter {name} = {expected}")]
    IncompatibleState {
        name: String,
        provided: String,
        expected: String,
    },

    /// Invalid dimensions for operations
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid action
    #[error("Invalid action {action}: must be less than {max_actions}")]
    InvalidAction {
        action: usize,
        max_actions: usize,
    },

    /// Failure reported by an environment implementation
    #[error("Environment error: {0}")]
    Environment(String),

    /// Numerical computation errors
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for DqnError {
    fn from(err: bincode::Error) -> Self {
        DqnError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DqnError {
    fn from(err: serde_json::Error) -> Self {
        DqnError::Serialization(err.to_string())
    }
}

// Helper functions for common error patterns
impl DqnError {
    pub fn configuration<S: Into<String>, R: Into<String>>(name: S, reason: R) -> Self {
        DqnError::Configuration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>, A: Into<String>>(expected: S, actual: A) -> Self {
        DqnError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn incompatible_state<S: Into<String>>(name: S, provided: impl ToString, expected: impl ToString) -> Self {
        DqnError::IncompatibleState {
            name: name.into(),
            provided: provided.to_string(),
            expected: expected.to_string(),
        }
    }
}
