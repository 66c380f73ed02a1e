use tracing::{info, warn};

/// Events emitted by the pipeline during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Selected {
        mailbox: String,
        uidvalidity: u32,
        exists: u32,
    },
    Scanned {
        candidates: usize,
        batches: usize,
    },
    BatchClassified {
        batch: usize,
        batches: usize,
        kept_new: usize,
        kept_prior: usize,
        duplicates: usize,
        vanished: usize,
    },
    Marked {
        batch: usize,
        count: usize,
    },
    WouldDelete {
        batch: usize,
        count: usize,
    },
    Purged,
    Reconnected {
        reason: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes one log line per event.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Selected {
                mailbox,
                uidvalidity,
                exists,
            } => info!(
                "Selected {} (UIDVALIDITY={}, {} messages)",
                mailbox, uidvalidity, exists
            ),
            ProgressEvent::Scanned {
                candidates,
                batches,
            } => info!(
                "Found {} candidates, processing in {} batches",
                candidates, batches
            ),
            ProgressEvent::BatchClassified {
                batch,
                batches,
                kept_new,
                kept_prior,
                duplicates,
                vanished,
            } => info!(
                "[Batch {}/{}] new: {}, existing: {}, duplicates: {}, vanished: {}",
                batch, batches, kept_new, kept_prior, duplicates, vanished
            ),
            ProgressEvent::Marked { batch, count } => {
                info!("[Batch {}] Marked {} duplicates for deletion", batch, count)
            }
            ProgressEvent::WouldDelete { batch, count } => {
                info!("[Batch {}] Would delete {} duplicates", batch, count)
            }
            ProgressEvent::Purged => info!("EXPUNGE completed"),
            ProgressEvent::Reconnected { reason } => {
                warn!("Reconnected after transport failure: {}", reason)
            }
        }
    }
}
