//! Error types for fixtest

use thiserror::Error;

/// Result type alias for fixtest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for fixtest
#[derive(Debug, Error)]
pub enum Error {
    /// Fixture is structurally malformed. Every problem found in the tree is
    /// collected here, each prefixed with the hierarchical node path.
    #[error("invalid fixture:\n  {}", .0.join("\n  "))]
    Structural(Vec<String>),

    /// A function could not be bound to a name in the registry
    #[error("registration error: {0}")]
    Registration(String),

    /// A call named a function the registry does not know
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A call's argument count does not match the registered arity
    #[error("{name}: expected {expected} argument(s), got {got}")]
    CallShape {
        /// Function name as registered
        name: String,
        /// Registered parameter count
        expected: usize,
        /// Arguments supplied by the fixture
        got: usize,
    },

    /// An argument or result could not be adapted to the expected type
    #[error("{name}: argument {index}: {message}")]
    Binding {
        /// Function name as registered
        name: String,
        /// Zero-based argument position
        index: usize,
        /// What went wrong during adaptation
        message: String,
    },

    /// Fixture file could not be decoded
    #[error("{path}: {message}")]
    Parse {
        /// Fixture file path
        path: String,
        /// Decoder error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Individual messages of a structural error, empty for other variants.
    pub fn structural_messages(&self) -> &[String] {
        match self {
            Error::Structural(msgs) => msgs,
            _ => &[],
        }
    }
}
