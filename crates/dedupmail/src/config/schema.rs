use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintPolicy;
use crate::transport::DateWindow;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub imap: ImapConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    /// Path of the seen-fingerprint index (default: `~/.dedupmail/seen.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

/// How the IMAP connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Implicit TLS (IMAPS).
    #[default]
    Tls,
    /// Plain connection upgraded with STARTTLS.
    StartTls,
    /// No encryption at all.
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImapConfig {
    /// IMAP server hostname (e.g., "imap.example.com").
    pub host: String,

    /// IMAP server port (default: 993).
    #[serde(default = "default_imap_port")]
    pub port: u16,

    #[serde(default)]
    pub security: Security,

    /// Login name (typically the email address).
    pub username: String,

    #[serde(default)]
    pub auth: PasswordSource,

    /// Per-command timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection attempts made by a single reconnect (default: 3).
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Delay before the second reconnect attempt, doubled after each failure (default: 1000).
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

fn default_imap_port() -> u16 {
    993
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

/// Where the IMAP password comes from, in priority order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSource {
    /// Direct password value.
    /// WARNING: Storing passwords directly in config files is insecure.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "passwordInsecure",
        alias = "password"
    )]
    pub password_insecure: Option<String>,

    /// File containing the password (e.g., a Docker secret).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    /// Environment variable containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeConfig {
    /// Mailbox to deduplicate (default: "INBOX").
    #[serde(default = "default_mailbox")]
    pub mailbox: String,

    /// Only consider messages with an internal date on or after this day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<NaiveDate>,

    /// Only consider messages with an internal date before this day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<NaiveDate>,

    /// UIDs classified per batch (default: 3000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// UIDs per deletion-mark request (default: 500).
    #[serde(default = "default_store_chunk_size")]
    pub store_chunk_size: usize,

    /// UIDs per flag query while reconciling (default: 800).
    #[serde(default = "default_flags_chunk_size")]
    pub flags_chunk_size: usize,

    /// Pause between batches in milliseconds (default: 0).
    #[serde(default)]
    pub sleep_ms: u64,

    /// Purge after this many batches; 0 purges only at the end (default: 5).
    #[serde(default = "default_expunge_interval")]
    pub expunge_interval: usize,

    /// Classify and report without marking or purging anything.
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub criteria: FingerprintPolicy,

    /// Times a failed request is retried after reconnecting (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_chunk_size() -> usize {
    3000
}

fn default_store_chunk_size() -> usize {
    500
}

fn default_flags_chunk_size() -> usize {
    800
}

fn default_expunge_interval() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            mailbox: default_mailbox(),
            since: None,
            before: None,
            chunk_size: default_chunk_size(),
            store_chunk_size: default_store_chunk_size(),
            flags_chunk_size: default_flags_chunk_size(),
            sleep_ms: 0,
            expunge_interval: default_expunge_interval(),
            dry_run: false,
            criteria: FingerprintPolicy::default(),
            max_retries: default_max_retries(),
        }
    }
}

impl DedupeConfig {
    pub fn date_window(&self) -> DateWindow {
        DateWindow::new(self.since, self.before)
    }
}
