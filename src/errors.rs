//! Error hierarchy for the state-table channels.
//!
//! Failures are grouped by where they originate: the store link, the stored
//! representation, signal plumbing, or configuration. An empty channel is not
//! an error (`pop` returns `None`) and a signal interrupting a wait is a
//! normal [`SelectOutcome`](crate::SelectOutcome), not an error.

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store link and store-side failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored data that cannot be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Signal registration failures
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation called in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller supplied argument rejected before touching the store
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Link to the store lost or handle already closed
    #[error("Connection to store failed: {0}")]
    Connection(String),

    /// The store is still loading its dataset; the command may succeed later
    #[error("{command} failed, reason: {reason}")]
    Loading { command: String, reason: String },

    /// Persistent backend failures
    #[error(transparent)]
    Sled(#[from] sled::Error),

    /// Transaction body aborted by a backend conflict
    #[error("Transaction {script} aborted: {reason}")]
    Aborted { script: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Row or queue message with an unreadable binary layout
    #[error("Failed to decode {what}: {source}")]
    Binary {
        what: &'static str,
        #[source]
        source: bincode::Error,
    },

    /// Notification payload that is not the expected JSON array
    #[error("Failed to decode notification payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid payload carrying unexpected content
    #[error("Malformed message on {origin}: {detail}")]
    Malformed { origin: String, detail: String },

    /// Operation label other than SET or DEL
    #[error("Unknown operation: {0}")]
    InvalidOperation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// OS refused the handler (or the signal cannot be caught)
    #[error("Failed to register handler for signal {signum}: {source}")]
    Register {
        signum: i32,
        #[source]
        source: std::io::Error,
    },

    /// The action saved at registration could not be put back
    #[error("Failed to restore previous action for signal {signum}: {source}")]
    Restore {
        signum: i32,
        #[source]
        source: std::io::Error,
    },

    /// Background runtime for signal listeners could not start
    #[error("Failed to start signal runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl Error {
    /// Whether retrying the same call after a pause can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Store(StoreError::Loading { .. }) | Error::Store(StoreError::Connection(_))
        )
    }

    pub(crate) fn is_loading(&self) -> bool {
        matches!(self, Error::Store(StoreError::Loading { .. }))
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Store(StoreError::Sled(e))
    }
}
