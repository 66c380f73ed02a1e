//! Mailbox transport seam.
//!
//! The dedupe pipeline talks to the remote store only through
//! [`MailboxTransport`]. Every operation reports either success, a
//! recoverable [`TransportError::Failure`] (connection dropped, timeout) or
//! a [`TransportError::Fatal`] error the run cannot recover from.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::fingerprint::HeaderDigestInput;

pub mod headers;
pub mod imap;

pub use imap::ImapTransport;

/// Errors returned by transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection failed; reconnecting may recover.
    #[error("transport failure: {0}")]
    Failure(String),

    /// The operation cannot succeed on this server or mailbox.
    #[error("fatal transport error: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Failure(_))
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// State of a freshly selected mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStatus {
    /// UIDVALIDITY of the mailbox; UIDs are only stable under one value.
    pub uidvalidity: u32,
    /// Number of messages in the mailbox.
    pub exists: u32,
}

/// Optional internal-date bounds for candidate selection.
///
/// `since` is inclusive and `before` exclusive, matching IMAP SEARCH.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub since: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(since: Option<NaiveDate>, before: Option<NaiveDate>) -> Self {
        Self { since, before }
    }

    /// Returns false when both bounds are set and the window is empty.
    pub fn is_valid(&self) -> bool {
        match (self.since, self.before) {
            (Some(since), Some(before)) => since < before,
            _ => true,
        }
    }
}

/// Operations the dedupe core needs from the remote mailbox.
#[async_trait]
pub trait MailboxTransport: Send {
    /// Opens `mailbox` read-write.
    async fn select(&mut self, mailbox: &str) -> TransportResult<MailboxStatus>;

    /// Lists UIDs of messages inside `window` in the selected mailbox.
    async fn search(&mut self, window: &DateWindow) -> TransportResult<Vec<u32>>;

    /// Reads fingerprint input for `uids` in one batched request.
    ///
    /// UIDs that no longer exist are absent from the returned map.
    async fn fetch_headers(
        &mut self,
        uids: &[u32],
    ) -> TransportResult<HashMap<u32, HeaderDigestInput>>;

    /// Flags `uids` for deletion.
    async fn mark_deleted(&mut self, uids: &[u32]) -> TransportResult<()>;

    /// Returns the subset of `uids` that exist and are not yet flagged for deletion.
    async fn query_unmarked(&mut self, uids: &[u32]) -> TransportResult<Vec<u32>>;

    /// Commits all pending deletion flags.
    async fn purge(&mut self) -> TransportResult<()>;

    /// Drops the current connection, connects again and re-selects `mailbox`.
    async fn reconnect_and_reselect(&mut self, mailbox: &str) -> TransportResult<MailboxStatus>;
}
