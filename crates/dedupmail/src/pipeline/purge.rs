//! Deletion marking and purging.
//!
//! ```text
//! IDLE -> MARKING -> (MARK_FAILED -> RECONCILING -> MARKING) -> PURGING
//!      -> (PURGE_FAILED -> RECONCILING -> PURGING) -> IDLE
//! ```
//!
//! After a failed mark request the controller reconnects and asks the
//! server which identifiers of the sub-chunk are still unmarked, then marks
//! only those. No identifier is sent twice once its mark is confirmed and
//! none is dropped.

use tracing::{debug, info, info_span, Instrument};

use crate::transport::MailboxTransport;

use super::context::RunContext;
use super::error::RunError;
use super::progress::ProgressEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeState {
    Idle,
    Marking,
    MarkFailed,
    Reconciling,
    Purging,
    PurgeFailed,
}

pub struct PurgeController {
    state: PurgeState,
    store_chunk_size: usize,
    flags_chunk_size: usize,
    expunge_interval: usize,
    dry_run: bool,
    batches_since_purge: usize,
    marked_since_purge: usize,
}

impl PurgeController {
    pub fn new(
        store_chunk_size: usize,
        flags_chunk_size: usize,
        expunge_interval: usize,
        dry_run: bool,
    ) -> Self {
        Self {
            state: PurgeState::Idle,
            store_chunk_size: store_chunk_size.max(1),
            flags_chunk_size: flags_chunk_size.max(1),
            expunge_interval,
            dry_run,
            batches_since_purge: 0,
            marked_since_purge: 0,
        }
    }

    pub fn state(&self) -> PurgeState {
        self.state
    }

    /// Handles the duplicates of one classified batch.
    ///
    /// Marks them in sub-chunks and purges when the interval is reached.
    /// In dry-run mode only the counters move.
    pub async fn submit<T: MailboxTransport>(
        &mut self,
        transport: &mut T,
        batch: usize,
        duplicates: &[u32],
        ctx: &mut RunContext<'_>,
    ) -> Result<(), RunError> {
        if self.dry_run {
            ctx.summary.would_delete += duplicates.len();
            if !duplicates.is_empty() {
                ctx.progress.report(ProgressEvent::WouldDelete {
                    batch,
                    count: duplicates.len(),
                });
            }
            return Ok(());
        }

        for sub_chunk in duplicates.chunks(self.store_chunk_size) {
            self.mark_sub_chunk(transport, sub_chunk, ctx).await?;
        }
        if !duplicates.is_empty() {
            ctx.progress.report(ProgressEvent::Marked {
                batch,
                count: duplicates.len(),
            });
        }

        self.batches_since_purge += 1;
        if self.expunge_interval > 0 && self.batches_since_purge >= self.expunge_interval {
            if self.marked_since_purge > 0 {
                self.purge(transport, ctx)
                    .instrument(info_span!("purge", batch))
                    .await?;
            } else {
                self.batches_since_purge = 0;
            }
        }
        Ok(())
    }

    /// Issues the closing purge. Does nothing in dry-run mode.
    pub async fn finish<T: MailboxTransport>(
        &mut self,
        transport: &mut T,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), RunError> {
        if self.dry_run {
            return Ok(());
        }
        self.purge(transport, ctx)
            .instrument(info_span!("purge", stage = "final"))
            .await
    }

    async fn mark_sub_chunk<T: MailboxTransport>(
        &mut self,
        transport: &mut T,
        sub_chunk: &[u32],
        ctx: &mut RunContext<'_>,
    ) -> Result<(), RunError> {
        let mut pending = sub_chunk.to_vec();
        let mut attempt = 0;

        while !pending.is_empty() {
            self.state = PurgeState::Marking;
            match transport.mark_deleted(&pending).await {
                Ok(()) => break,
                Err(e) => {
                    self.state = PurgeState::MarkFailed;
                    let reason = e.to_string();
                    ctx.check_retry("UID STORE", &mut attempt, e)?;
                    pending = self.reconcile(transport, &pending, &reason, ctx).await?;
                }
            }
        }

        debug!(count = sub_chunk.len(), "sub-chunk marked");
        ctx.summary.deleted += sub_chunk.len();
        self.marked_since_purge += sub_chunk.len();
        self.state = PurgeState::Idle;
        Ok(())
    }

    /// Re-establishes the session and returns the identifiers still unmarked.
    async fn reconcile<T: MailboxTransport>(
        &mut self,
        transport: &mut T,
        pending: &[u32],
        reason: &str,
        ctx: &mut RunContext<'_>,
    ) -> Result<Vec<u32>, RunError> {
        self.state = PurgeState::Reconciling;

        ctx.reconnect(transport, reason)
            .await
            .map_err(|e| reconciliation_error(&ctx.mailbox, e))?;

        let mut unmarked = Vec::with_capacity(pending.len());
        for slice in pending.chunks(self.flags_chunk_size) {
            let still = transport.query_unmarked(slice).await.map_err(|e| {
                RunError::Reconciliation {
                    mailbox: ctx.mailbox.clone(),
                    reason: format!("flag query failed: {}", e),
                }
            })?;
            unmarked.extend(still.into_iter().filter(|uid| slice.contains(uid)));
        }

        info!(
            "Reconciled {} pending marks: {} already applied, {} remaining",
            pending.len(),
            pending.len().saturating_sub(unmarked.len()),
            unmarked.len()
        );
        Ok(unmarked)
    }

    async fn purge<T: MailboxTransport>(
        &mut self,
        transport: &mut T,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), RunError> {
        let mut attempt = 0;

        loop {
            self.state = PurgeState::Purging;
            match transport.purge().await {
                Ok(()) => break,
                Err(e) => {
                    self.state = PurgeState::PurgeFailed;
                    let reason = e.to_string();
                    ctx.check_retry("EXPUNGE", &mut attempt, e)?;
                    self.state = PurgeState::Reconciling;
                    ctx.reconnect(transport, &reason)
                        .await
                        .map_err(|e| reconciliation_error(&ctx.mailbox, e))?;
                }
            }
        }

        ctx.summary.purges += 1;
        ctx.progress.report(ProgressEvent::Purged);
        self.batches_since_purge = 0;
        self.marked_since_purge = 0;
        self.state = PurgeState::Idle;
        Ok(())
    }
}

/// A UIDVALIDITY change keeps its own variant; anything else during
/// recovery is a reconciliation failure.
fn reconciliation_error(mailbox: &str, err: RunError) -> RunError {
    match err {
        RunError::UidValidityChanged { .. } => err,
        other => RunError::Reconciliation {
            mailbox: mailbox.to_string(),
            reason: other.to_string(),
        },
    }
}
