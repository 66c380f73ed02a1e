//! Index storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from seen-fingerprint index operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating the index directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// An insert was ignored as a conflict but the conflicting row could not be read back.
    #[error("Seen entry for fingerprint {fingerprint} in '{mailbox}' vanished during insert")]
    EntryVanished {
        mailbox: String,
        fingerprint: String,
    },

    /// The connection lock was poisoned by a panicking thread.
    #[error("Database lock poisoned")]
    LockPoisoned,
}
