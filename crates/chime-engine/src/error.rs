//! Error types for the reminder engine.

use thiserror::Error;

/// Errors from storage collaborators (reminder source, delivery ledger).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded.
    #[error("malformed store data: {0}")]
    Malformed(String),

    /// Catch-all for backend-specific failures.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors raised by a notification sink to signal delivery failure.
///
/// All sink errors are treated as transient by the service: the occurrence
/// stays eligible for delivery on a later poll.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the local output stream failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport rejected or failed a send.
    #[error("transport error: {0}")]
    Transport(String),

    /// All retry attempts were exhausted.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Errors that can abort a whole poll (never a single delivery).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reading from a storage collaborator failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
