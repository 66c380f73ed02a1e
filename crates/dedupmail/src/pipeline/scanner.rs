use tracing::debug;

use crate::transport::{DateWindow, MailboxTransport};

use super::context::RunContext;
use super::error::RunError;

/// Enumerates the identifiers in scope for a run.
///
/// Scanning never fingerprints and can always be recomputed from scratch.
pub struct CandidateScanner {
    window: DateWindow,
}

impl CandidateScanner {
    pub fn new(window: DateWindow) -> Self {
        Self { window }
    }

    /// Returns the candidate UIDs in ascending order, without repeats.
    pub async fn scan<T: MailboxTransport>(
        &self,
        transport: &mut T,
        ctx: &mut RunContext<'_>,
    ) -> Result<Vec<u32>, RunError> {
        let mut attempt = 0;
        let mut uids = loop {
            match transport.search(&self.window).await {
                Ok(uids) => break uids,
                Err(e) => {
                    let reason = e.to_string();
                    ctx.check_retry("UID SEARCH", &mut attempt, e)?;
                    ctx.reconnect(transport, &reason).await?;
                }
            }
        };

        uids.sort_unstable();
        uids.dedup();
        debug!(candidates = uids.len(), "scan finished");
        Ok(uids)
    }
}
