//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::time::Duration;

use dedupmail::config::DedupeConfig;
use dedupmail::{FingerprintPolicy, HeaderDigestInput, PipelineConfig};

/// Builder for creating `HeaderDigestInput` instances.
pub struct MessageBuilder {
    input: HeaderDigestInput,
}

impl MessageBuilder {
    /// A message with plausible headers and no Message-ID.
    pub fn new() -> Self {
        Self {
            input: HeaderDigestInput {
                message_id: String::new(),
                date: "2024-01-01T10:00:00+00:00".to_string(),
                from: "Alice <alice@example.com>".to_string(),
                to: "bob@example.com".to_string(),
                subject: "Hello".to_string(),
                size: 1024,
            },
        }
    }

    pub fn message_id(mut self, id: &str) -> Self {
        self.input.message_id = id.to_string();
        self
    }

    pub fn date(mut self, date: &str) -> Self {
        self.input.date = date.to_string();
        self
    }

    pub fn from(mut self, from: &str) -> Self {
        self.input.from = from.to_string();
        self
    }

    pub fn to(mut self, to: &str) -> Self {
        self.input.to = to.to_string();
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.input.subject = subject.to_string();
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.input.size = size;
        self
    }

    pub fn build(self) -> HeaderDigestInput {
        self.input
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A message distinguished only by its Message-ID.
pub fn message_with_id(id: &str) -> HeaderDigestInput {
    MessageBuilder::new()
        .message_id(id)
        .subject(&format!("subject of {}", id))
        .build()
}

/// Builder for creating `PipelineConfig` instances.
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Defaults with no pacing delay.
    pub fn new() -> Self {
        let mut config = PipelineConfig::from_dedupe(&DedupeConfig::default());
        config.sleep = Duration::ZERO;
        Self { config }
    }

    pub fn mailbox(mut self, mailbox: &str) -> Self {
        self.config.mailbox = mailbox.to_string();
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn store_chunk_size(mut self, size: usize) -> Self {
        self.config.store_chunk_size = size;
        self
    }

    pub fn flags_chunk_size(mut self, size: usize) -> Self {
        self.config.flags_chunk_size = size;
        self
    }

    pub fn expunge_interval(mut self, interval: usize) -> Self {
        self.config.expunge_interval = interval;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn policy(mut self, policy: FingerprintPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
