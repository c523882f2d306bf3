//! Result and error types for Interpose.

use thiserror::Error;

/// Result type for Interpose operations
pub type MockResult<T> = Result<T, MockError>;

/// Errors that can occur while configuring, dispatching or verifying mocks
#[derive(Debug, Error)]
pub enum MockError {
    /// Target or instance could not be mocked (absent, not callable, method not found)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Value count differs from the declared arity
    #[error("Expected values count ({expected}) is different than the actual size ({actual})")]
    Arity {
        /// Declared arity
        expected: usize,
        /// Number of supplied values
        actual: usize,
    },

    /// Value is not assignable to the declared type
    #[error("Type at index {index} is different than expected ({expected}): actual type {actual}")]
    Type {
        /// Position of the offending value
        index: usize,
        /// Declared type name
        expected: String,
        /// Supplied type name
        actual: String,
    },

    /// Absent value at a position whose type cannot be absent
    #[error("Cannot assign an absent value at index {index} to the type {expected}")]
    IllegalAbsent {
        /// Position of the offending value
        index: usize,
        /// Declared type name
        expected: String,
    },

    /// `verify` found no recorded call matching the expectation
    #[error("Expected call: {expected}; {}", describe_recorded(.recorded))]
    UnmatchedCall {
        /// The expected call, formatted
        expected: String,
        /// Every recorded call, formatted, in invocation order
        recorded: Vec<String>,
    },

    /// A stub was completed twice
    #[error("The stub is already configured, please create a new one")]
    AlreadyCompleted,

    /// Interception reached a target with no session and no real implementation
    #[error("Internal invariant violated: {message}")]
    InternalInvariant {
        /// Error message
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MockError {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal invariant error
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InternalInvariant {
            message: message.into(),
        }
    }

    /// Short, stable name of the error category
    #[must_use]
    pub const fn kind(&self) -> MockErrorKind {
        match self {
            Self::Configuration { .. } => MockErrorKind::Configuration,
            Self::Arity { .. } => MockErrorKind::Arity,
            Self::Type { .. } | Self::IllegalAbsent { .. } => MockErrorKind::Type,
            Self::UnmatchedCall { .. } => MockErrorKind::UnmatchedCall,
            Self::AlreadyCompleted => MockErrorKind::AlreadyCompleted,
            Self::InternalInvariant { .. } => MockErrorKind::InternalInvariant,
            Self::Config { .. } | Self::Io(_) | Self::Yaml(_) | Self::Json(_) => {
                MockErrorKind::Config
            }
        }
    }
}

/// Category of a [`MockError`], used when failures are collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MockErrorKind {
    /// Absent or non-callable target, method not found
    Configuration,
    /// Wrong number of values
    Arity,
    /// Wrong type, or absent where not allowed
    Type,
    /// Verification found no matching call
    UnmatchedCall,
    /// Stub reused
    AlreadyCompleted,
    /// Wiring defect, fatal
    InternalInvariant,
    /// Invalid `MockConfig` source
    Config,
}

fn describe_recorded(recorded: &[String]) -> String {
    if recorded.is_empty() {
        "but no call was recorded".to_string()
    } else {
        format!(
            "but it recorded the following instead: {}",
            recorded.join(", ")
        )
    }
}
