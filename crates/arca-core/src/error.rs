use thiserror::Error;

/// Canonical error type for backup lifecycle operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity was not found in the schedule store.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"schedule"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Trigger definition cannot produce a next fire time.
    #[error("invalid trigger: {message}")]
    InvalidTrigger {
        /// Human-readable explanation of the rejected trigger.
        message: String,
    },

    /// Operation violates current state machine rules.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// The backup gateway reported a failure.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// A backup job exceeded its completion deadline.
    #[error("job `{job_id}` timed out after {timeout_secs}s")]
    JobTimeout {
        /// Gateway job identifier.
        job_id: String,
        /// Deadline that was exceeded.
        timeout_secs: u64,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error occurred during store file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Validation error for input data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `InvalidTrigger` variant.
    #[must_use]
    pub fn invalid_trigger(message: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            message: message.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `Gateway` variant.
    #[must_use]
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway(message.into())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

/// Convenient result alias for backup lifecycle operations.
pub type CoreResult<T> = Result<T, CoreError>;
