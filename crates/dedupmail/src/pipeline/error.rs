use thiserror::Error;

use crate::db::DatabaseError;
use crate::transport::TransportError;

/// Errors that end a run early.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Index error: {0}")]
    Index(#[from] DatabaseError),

    #[error("Reconnect to '{mailbox}' failed: {source}")]
    Reconnect {
        mailbox: String,
        #[source]
        source: TransportError,
    },

    #[error("Reconciliation of '{mailbox}' failed: {reason}")]
    Reconciliation { mailbox: String, reason: String },

    #[error("UIDVALIDITY of '{mailbox}' changed from {expected} to {actual}")]
    UidValidityChanged {
        mailbox: String,
        expected: u32,
        actual: u32,
    },

    #[error("{operation} still failing after {attempts} retries: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: TransportError,
    },
}
