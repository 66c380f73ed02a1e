//! Run counters and the final report.

use std::fmt;

use super::classifier::Classification;

/// Aggregated counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dry_run: bool,
    /// Identifiers returned by the candidate scan.
    pub scanned: usize,
    pub kept_new: usize,
    pub kept_prior: usize,
    pub duplicates: usize,
    /// Duplicates whose deletion mark was confirmed.
    pub deleted: usize,
    /// Duplicates a dry run would have marked.
    pub would_delete: usize,
    /// Candidates that disappeared before their headers were fetched.
    pub vanished: usize,
    pub batches: usize,
    pub purges: usize,
    pub reconnects: usize,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::KeptNew => self.kept_new += 1,
            Classification::KeptPrior => self.kept_prior += 1,
            Classification::Duplicate { .. } => self.duplicates += 1,
        }
    }

    pub fn kept(&self) -> usize {
        self.kept_new + self.kept_prior
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Kept: {} (new: {}, existing: {}) | ",
            self.kept(),
            self.kept_new,
            self.kept_prior
        )?;
        if self.dry_run {
            write!(f, "Duplicates to delete (dry-run): {}", self.would_delete)
        } else {
            write!(f, "Duplicates deleted: {}", self.deleted)
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped between chunks on request.
    Cancelled,
    /// Stopped by an unrecoverable error; counts cover the work done so far.
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub summary: RunSummary,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            RunOutcome::Completed => write!(f, "{}", self.summary),
            RunOutcome::Cancelled => write!(f, "{} (cancelled)", self.summary),
            RunOutcome::Aborted { reason } => {
                write!(f, "{} (aborted: {})", self.summary, reason)
            }
        }
    }
}
