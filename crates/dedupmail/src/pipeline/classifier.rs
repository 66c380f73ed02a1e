use tracing::debug;

use crate::fingerprint::{fingerprint, FingerprintPolicy};
use crate::index::SeenIndex;
use crate::transport::MailboxTransport;

use super::context::RunContext;
use super::error::RunError;

/// Verdict for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// First occurrence of its fingerprint; recorded as the keeper.
    KeptNew,
    /// Already recorded as the keeper by an earlier run.
    KeptPrior,
    /// Another message holds the fingerprint.
    Duplicate { keeper: u32 },
}

/// Verdicts for one chunk, in scan order.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedBatch {
    pub verdicts: Vec<(u32, Classification)>,
    /// Candidates that no longer existed at fetch time.
    pub vanished: usize,
}

impl ClassifiedBatch {
    pub fn duplicates(&self) -> Vec<u32> {
        self.verdicts
            .iter()
            .filter(|(_, c)| matches!(c, Classification::Duplicate { .. }))
            .map(|(uid, _)| *uid)
            .collect()
    }

    /// Returns (kept new, kept prior, duplicates).
    pub fn tally(&self) -> (usize, usize, usize) {
        self.verdicts
            .iter()
            .fold((0, 0, 0), |(new, prior, dup), (_, c)| match c {
                Classification::KeptNew => (new + 1, prior, dup),
                Classification::KeptPrior => (new, prior + 1, dup),
                Classification::Duplicate { .. } => (new, prior, dup + 1),
            })
    }
}

pub struct BatchClassifier {
    index: SeenIndex,
    policy: FingerprintPolicy,
}

impl BatchClassifier {
    pub fn new(index: SeenIndex, policy: FingerprintPolicy) -> Self {
        Self { index, policy }
    }

    /// Fetches headers for `uids` in one request and classifies each in order.
    pub async fn classify<T: MailboxTransport>(
        &self,
        transport: &mut T,
        uids: &[u32],
        ctx: &mut RunContext<'_>,
    ) -> Result<ClassifiedBatch, RunError> {
        let mut attempt = 0;
        let inputs = loop {
            match transport.fetch_headers(uids).await {
                Ok(inputs) => break inputs,
                Err(e) => {
                    let reason = e.to_string();
                    ctx.check_retry("UID FETCH", &mut attempt, e)?;
                    ctx.reconnect(transport, &reason).await?;
                }
            }
        };

        let mut batch = ClassifiedBatch {
            verdicts: Vec::with_capacity(uids.len()),
            vanished: 0,
        };

        for &uid in uids {
            let Some(input) = inputs.get(&uid) else {
                debug!(uid, "candidate vanished before fetch, skipping");
                batch.vanished += 1;
                continue;
            };

            let fp = fingerprint(input, self.policy);
            let lookup = self.index.lookup_or_insert(&fp, uid)?;
            let verdict = if lookup.is_new {
                Classification::KeptNew
            } else if lookup.recorded_uid == uid {
                Classification::KeptPrior
            } else {
                Classification::Duplicate {
                    keeper: lookup.recorded_uid,
                }
            };
            batch.verdicts.push((uid, verdict));
        }

        Ok(batch)
    }
}
