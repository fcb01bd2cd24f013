pub mod measurement;
pub mod retry;

/// Error taxonomy shared by every workflow operation.
///
/// `Ledger` failures with `retryable` set are the only class eligible for
/// automatic retry; everything else is surfaced to the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("operation not allowed in status {current}, requires {required}")]
    InvalidState { current: String, required: String },

    #[error("{message} (blocked by: {})", blocking.join(", "))]
    Conflict {
        message: String,
        blocking: Vec<String>,
    },

    #[error("already processed: {0}")]
    AlreadyProcessed(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("statement {0} has no lines")]
    EmptyStatement(String),

    #[error("channel {channel} capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded {
        channel: String,
        requested: i64,
        available: i64,
    },

    #[error("ledger failure: {message}")]
    Ledger { message: String, retryable: bool },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(current: impl ToString, required: impl ToString) -> Self {
        Self::InvalidState {
            current: current.to_string(),
            required: required.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>, blocking: Vec<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            blocking,
        }
    }

    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn ledger_retryable(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Ledger { retryable: true, .. })
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
