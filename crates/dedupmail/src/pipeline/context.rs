use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::transport::{MailboxStatus, MailboxTransport, TransportError};

use super::error::RunError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::summary::RunSummary;

/// Cooperative stop request, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared by the run's components for the duration of one run.
pub struct RunContext<'a> {
    pub mailbox: String,
    /// UIDVALIDITY observed at the initial select.
    pub uidvalidity: u32,
    pub max_retries: u32,
    pub summary: RunSummary,
    pub progress: &'a dyn ProgressReporter,
}

impl<'a> RunContext<'a> {
    pub fn new(
        mailbox: impl Into<String>,
        uidvalidity: u32,
        max_retries: u32,
        summary: RunSummary,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            mailbox: mailbox.into(),
            uidvalidity,
            max_retries,
            summary,
            progress,
        }
    }

    /// Decides whether a failed request may be retried.
    ///
    /// Fatal errors and an exhausted budget end the run; otherwise the
    /// attempt counter is advanced and the caller should reconnect.
    pub fn check_retry(
        &self,
        operation: &'static str,
        attempt: &mut u32,
        err: TransportError,
    ) -> Result<(), RunError> {
        if !err.is_recoverable() {
            return Err(RunError::Transport(err));
        }
        if *attempt >= self.max_retries {
            return Err(RunError::RetriesExhausted {
                operation,
                attempts: *attempt,
                last: err,
            });
        }
        *attempt += 1;
        warn!(
            "{} failed ({}), reconnecting (retry {}/{})",
            operation, err, attempt, self.max_retries
        );
        Ok(())
    }

    /// Reconnects, re-selects the mailbox and checks UIDs are still valid.
    pub async fn reconnect<T: MailboxTransport>(
        &mut self,
        transport: &mut T,
        reason: &str,
    ) -> Result<MailboxStatus, RunError> {
        let status = transport
            .reconnect_and_reselect(&self.mailbox)
            .await
            .map_err(|source| RunError::Reconnect {
                mailbox: self.mailbox.clone(),
                source,
            })?;
        self.summary.reconnects += 1;

        if status.uidvalidity != self.uidvalidity {
            return Err(RunError::UidValidityChanged {
                mailbox: self.mailbox.clone(),
                expected: self.uidvalidity,
                actual: status.uidvalidity,
            });
        }

        self.progress.report(ProgressEvent::Reconnected {
            reason: reason.to_string(),
        });
        Ok(status)
    }
}
