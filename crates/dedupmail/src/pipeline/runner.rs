use tracing::{info, info_span, warn, Instrument};

use crate::db::Database;
use crate::error::ConfigError;
use crate::index::{IndexScope, SeenIndex};
use crate::transport::{MailboxStatus, MailboxTransport};

use super::classifier::BatchClassifier;
use super::config::PipelineConfig;
use super::context::{CancelToken, RunContext};
use super::error::RunError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::purge::PurgeController;
use super::scanner::CandidateScanner;
use super::summary::{RunOutcome, RunReport, RunSummary};

pub struct Pipeline {
    config: PipelineConfig,
    db: Database,
}

impl Pipeline {
    /// Validates `config` before anything touches the mailbox.
    pub fn new(config: PipelineConfig, db: Database) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, db })
    }

    /// Deduplicates the configured mailbox.
    ///
    /// Always returns a report; errors end the run as
    /// [`RunOutcome::Aborted`] with the counts reached so far.
    pub async fn run<T: MailboxTransport>(
        &self,
        transport: &mut T,
        progress: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> RunReport {
        let span = info_span!("dedupe_run",
            mailbox = %self.config.mailbox,
            dry_run = self.config.dry_run,
            policy = %self.config.policy,
        );

        async {
            let mut summary = RunSummary::new(self.config.dry_run);
            let outcome = match self.execute(transport, progress, cancel, &mut summary).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Run aborted: {}", e);
                    RunOutcome::Aborted {
                        reason: e.to_string(),
                    }
                }
            };
            info!("{}", summary);
            RunReport { summary, outcome }
        }
        .instrument(span)
        .await
    }

    async fn execute<T: MailboxTransport>(
        &self,
        transport: &mut T,
        progress: &dyn ProgressReporter,
        cancel: &CancelToken,
        summary: &mut RunSummary,
    ) -> Result<RunOutcome, RunError> {
        let status = self.select(transport, summary).await?;
        progress.report(ProgressEvent::Selected {
            mailbox: self.config.mailbox.clone(),
            uidvalidity: status.uidvalidity,
            exists: status.exists,
        });

        let scope = IndexScope::new(&self.config.mailbox, status.uidvalidity);
        let index = SeenIndex::open(self.db.clone(), scope)?;
        info!(
            "Index for {} holds {} fingerprints",
            index.scope(),
            index.entry_count()?
        );
        let classifier = BatchClassifier::new(index, self.config.policy);
        let mut purger = PurgeController::new(
            self.config.store_chunk_size,
            self.config.flags_chunk_size,
            self.config.expunge_interval,
            self.config.dry_run,
        );

        let mut ctx = RunContext::new(
            &self.config.mailbox,
            status.uidvalidity,
            self.config.max_retries,
            std::mem::take(summary),
            progress,
        );
        let result = self
            .process(transport, &classifier, &mut purger, &mut ctx, cancel)
            .await;
        *summary = ctx.summary;
        result
    }

    async fn process<T: MailboxTransport>(
        &self,
        transport: &mut T,
        classifier: &BatchClassifier,
        purger: &mut PurgeController,
        ctx: &mut RunContext<'_>,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, RunError> {
        let scanner = CandidateScanner::new(self.config.window);
        let candidates = scanner.scan(transport, ctx).await?;
        ctx.summary.scanned = candidates.len();

        if candidates.is_empty() {
            info!("No messages in scope");
            return Ok(RunOutcome::Completed);
        }

        let chunks: Vec<&[u32]> = candidates.chunks(self.config.chunk_size).collect();
        let total = chunks.len();
        ctx.progress.report(ProgressEvent::Scanned {
            candidates: candidates.len(),
            batches: total,
        });

        let mut outcome = RunOutcome::Completed;
        for (i, chunk) in chunks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Cancellation requested, stopping before batch {}", i + 1);
                outcome = RunOutcome::Cancelled;
                break;
            }

            let batch = i + 1;
            self.process_batch(transport, classifier, purger, ctx, batch, total, chunk)
                .instrument(info_span!("batch", batch, size = chunk.len()))
                .await?;

            if !self.config.sleep.is_zero() && batch < total {
                tokio::time::sleep(self.config.sleep).await;
            }
        }

        purger.finish(transport, ctx).await?;
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_batch<T: MailboxTransport>(
        &self,
        transport: &mut T,
        classifier: &BatchClassifier,
        purger: &mut PurgeController,
        ctx: &mut RunContext<'_>,
        batch: usize,
        total: usize,
        chunk: &[u32],
    ) -> Result<(), RunError> {
        let classified = classifier.classify(transport, chunk, ctx).await?;
        for (_, verdict) in &classified.verdicts {
            ctx.summary.record(*verdict);
        }
        ctx.summary.vanished += classified.vanished;
        ctx.summary.batches += 1;

        let (kept_new, kept_prior, duplicates) = classified.tally();
        ctx.progress.report(ProgressEvent::BatchClassified {
            batch,
            batches: total,
            kept_new,
            kept_prior,
            duplicates,
            vanished: classified.vanished,
        });

        purger
            .submit(transport, batch, &classified.duplicates(), ctx)
            .await
    }

    /// Opens the mailbox, reconnecting on transport failures.
    async fn select<T: MailboxTransport>(
        &self,
        transport: &mut T,
        summary: &mut RunSummary,
    ) -> Result<MailboxStatus, RunError> {
        let mailbox = &self.config.mailbox;
        let mut attempt = 0;
        let mut result = transport.select(mailbox).await;

        loop {
            match result {
                Ok(status) => return Ok(status),
                Err(e) if !e.is_recoverable() => return Err(RunError::Transport(e)),
                Err(e) if attempt >= self.config.max_retries => {
                    return Err(RunError::RetriesExhausted {
                        operation: "SELECT",
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => {
                    attempt += 1;
                    warn!("SELECT failed ({}), reconnecting", e);
                    summary.reconnects += 1;
                    result = transport.reconnect_and_reselect(mailbox).await;
                }
            }
        }
    }
}
