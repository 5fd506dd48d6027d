//! geomr error types

/// geomr result type
pub type Result<T> = std::result::Result<T, Error>;

/// geomr errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from numr operations
    #[error("numr error: {0}")]
    Numr(#[from] numr::error::Error),

    /// Invalid configuration, or an input combination the configuration forbids
    #[error("configuration error: {reason}")]
    Config {
        /// Description of what went wrong
        reason: String,
    },

    /// Input dimensions disagree with the configuration or with each other
    #[error("shape mismatch for '{arg}': expected {expected}, got {got:?}")]
    ShapeMismatch {
        /// Argument name
        arg: &'static str,
        /// Human-readable expected layout
        expected: String,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Invalid argument to an operation
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// Argument name
        arg: &'static str,
        /// Why it's invalid
        reason: String,
    },

    /// Model construction or weight loading error
    #[error("model error: {reason}")]
    ModelError {
        /// Description of what went wrong
        reason: String,
    },
}

impl Error {
    pub(crate) fn shape(arg: &'static str, expected: impl Into<String>, got: &[usize]) -> Self {
        Error::ShapeMismatch {
            arg,
            expected: expected.into(),
            got: got.to_vec(),
        }
    }
}
