//! Test harness for runs against a file-backed index.
//!
//! Each harness owns a temporary directory holding the SQLite index, so
//! several runs can share one index the way repeated invocations would.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::TempDir;

use dedupmail::db::seen_repo;
use dedupmail::pipeline::{CancelToken, NoopProgress, ProgressEvent, ProgressReporter};
use dedupmail::{Database, Pipeline, PipelineConfig, RunReport};

use super::mailbox::ScriptedMailbox;

pub struct TestHarness {
    /// Keeps the index directory alive for the harness lifetime.
    temp_dir: TempDir,
    pub db_path: PathBuf,
    db: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("seen.db");
        let db = Database::open(&db_path).expect("Failed to open index");
        Self {
            temp_dir,
            db_path,
            db,
        }
    }

    pub fn db(&self) -> Database {
        self.db.clone()
    }

    /// Reopens the index from disk, as a fresh process would.
    pub fn reopen(&mut self) {
        self.db = Database::open(&self.db_path).expect("Failed to reopen index");
    }

    pub fn pipeline(&self, config: PipelineConfig) -> Pipeline {
        Pipeline::new(config, self.db()).expect("Invalid pipeline config")
    }

    pub async fn run(&self, mailbox: &mut ScriptedMailbox, config: PipelineConfig) -> RunReport {
        self.pipeline(config)
            .run(mailbox, &NoopProgress, &CancelToken::new())
            .await
    }

    pub fn index_len(&self, mailbox: &str, uidvalidity: u32) -> u64 {
        seen_repo::count_by_scope(&self.db, mailbox, uidvalidity).expect("Failed to count index")
    }

    pub fn keeper_of(&self, mailbox: &str, uidvalidity: u32, fingerprint: &str) -> Option<u32> {
        seen_repo::find_keep_uid(&self.db, mailbox, uidvalidity, fingerprint)
            .expect("Failed to query index")
    }
}

/// Collects every progress event for later assertions.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("progress lock poisoned").clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().expect("progress lock poisoned").push(event);
    }
}

/// Requests cancellation once `after` batches have been classified.
pub struct CancelAfterBatches {
    pub token: CancelToken,
    pub after: usize,
}

impl ProgressReporter for CancelAfterBatches {
    fn report(&self, event: ProgressEvent) {
        if let ProgressEvent::BatchClassified { batch, .. } = event {
            if batch >= self.after {
                self.token.cancel();
            }
        }
    }
}
