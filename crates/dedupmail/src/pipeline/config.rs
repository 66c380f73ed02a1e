use std::time::Duration;

use crate::config::{Config, DedupeConfig};
use crate::error::ConfigError;
use crate::fingerprint::FingerprintPolicy;
use crate::transport::DateWindow;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mailbox: String,
    pub window: DateWindow,
    pub chunk_size: usize,
    pub store_chunk_size: usize,
    pub flags_chunk_size: usize,
    pub sleep: Duration,
    pub expunge_interval: usize,
    pub dry_run: bool,
    pub policy: FingerprintPolicy,
    pub max_retries: u32,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self::from_dedupe(&config.dedupe)
    }

    pub fn from_dedupe(dedupe: &DedupeConfig) -> Self {
        Self {
            mailbox: dedupe.mailbox.clone(),
            window: dedupe.date_window(),
            chunk_size: dedupe.chunk_size,
            store_chunk_size: dedupe.store_chunk_size,
            flags_chunk_size: dedupe.flags_chunk_size,
            sleep: Duration::from_millis(dedupe.sleep_ms),
            expunge_interval: dedupe.expunge_interval,
            dry_run: dedupe.dry_run,
            policy: dedupe.criteria,
            max_retries: dedupe.max_retries,
        }
    }

    /// Rejects settings that would make the run meaningless before any remote call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "dedupe.mailbox",
                reason: "must not be empty".to_string(),
            });
        }

        for (field, value) in [
            ("dedupe.chunkSize", self.chunk_size),
            ("dedupe.storeChunkSize", self.store_chunk_size),
            ("dedupe.flagsChunkSize", self.flags_chunk_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be positive".to_string(),
                });
            }
        }

        if !self.window.is_valid() {
            let show = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
            return Err(ConfigError::InvalidDateRange {
                since: show(self.window.since),
                before: show(self.window.before),
            });
        }

        Ok(())
    }
}
