use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

use dedupmail::config::{DedupeConfig, ImapConfig, PasswordSource, Security};
use dedupmail::{load_config, Config, ConfigError, FingerprintPolicy};

#[derive(Debug, Parser)]
#[clap(
    name = "dedupmail",
    about = "Remove duplicate messages from an IMAP mailbox, keeping the oldest copy.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Args {
    /// JSON config file; flags given on the command line override it.
    #[clap(long, env = "DEDUPMAIL_CONFIG")]
    pub config: Option<PathBuf>,

    #[clap(short = 'H', long, help = "IMAP server hostname")]
    pub host: Option<String>,

    #[clap(short = 'P', long, help = "IMAP server port [default: 993]")]
    pub port: Option<u16>,

    #[clap(short = 'u', long, help = "Login name")]
    pub user: Option<String>,

    #[clap(
        short = 'p',
        long,
        env = "DEDUPMAIL_PASSWORD",
        hide_env_values = true,
        help = "Login password"
    )]
    pub password: Option<String>,

    #[clap(long, help = "Read the password from this file")]
    pub password_file: Option<String>,

    #[clap(long, help = "Read the password from this environment variable")]
    pub password_env: Option<String>,

    #[clap(short = 'm', long, help = "Mailbox to deduplicate [default: INBOX]")]
    pub mailbox: Option<String>,

    #[clap(long, conflicts_with = "starttls", help = "Connect without TLS")]
    pub no_ssl: bool,

    #[clap(long, help = "Upgrade a plain connection with STARTTLS")]
    pub starttls: bool,

    #[clap(long, value_name = "YYYY-MM-DD", help = "Only messages on or after this day")]
    pub since: Option<NaiveDate>,

    #[clap(long, value_name = "YYYY-MM-DD", help = "Only messages before this day")]
    pub before: Option<NaiveDate>,

    #[clap(long, help = "Batch size for UID list processing [default: 3000]")]
    pub chunk: Option<usize>,

    #[clap(long, help = "Batch size per UID STORE command [default: 500]")]
    pub store_chunk: Option<usize>,

    #[clap(long, help = "Batch size per FLAGS check when resuming [default: 800]")]
    pub fetch_flags_chunk: Option<usize>,

    #[clap(long, value_name = "SECONDS", help = "Sleep seconds between batches [default: 0]")]
    pub sleep: Option<f64>,

    #[clap(long, value_name = "SECONDS", help = "Timeout for IMAP operations [default: 120]")]
    pub timeout: Option<u64>,

    #[clap(long, help = "Seen-fingerprint index [default: ~/.dedupmail/seen.db]")]
    pub db: Option<String>,

    #[clap(long, value_parser = ["msgid_first", "composite_only"], help = "Fingerprint policy [default: msgid_first]")]
    pub criteria: Option<String>,

    #[clap(long, help = "Report duplicates without deleting anything")]
    pub dry_run: bool,

    #[clap(long, help = "Expunge after N batches, 0 = only at end [default: 5]")]
    pub expunge_interval: Option<usize>,

    #[clap(long, help = "Retries per failed request after reconnecting [default: 3]")]
    pub max_retries: Option<u32>,

    #[clap(long, help = "Forget recorded fingerprints of the mailbox before running")]
    pub reset_index: bool,

    #[clap(
        long,
        default_value = "info",
        env = "DEDUPMAIL_LOG_LEVEL",
        help = "Log level when RUST_LOG is not set"
    )]
    pub log_level: String,
}

impl Args {
    /// Builds the run configuration from the config file, if any, and the flags.
    ///
    /// The result is not validated yet.
    pub fn resolve_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => Config {
                imap: ImapConfig {
                    host: self.host.clone().ok_or_else(|| missing("--host"))?,
                    port: 993,
                    security: Security::default(),
                    username: self.user.clone().ok_or_else(|| missing("--user"))?,
                    auth: PasswordSource::default(),
                    timeout_secs: 120,
                    reconnect_attempts: 3,
                    reconnect_backoff_ms: 1000,
                },
                dedupe: DedupeConfig::default(),
                database_path: None,
            },
        };
        self.apply(&mut config)?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        let imap = &mut config.imap;
        if let Some(host) = &self.host {
            imap.host = host.clone();
        }
        if let Some(user) = &self.user {
            imap.username = user.clone();
        }
        if let Some(port) = self.port {
            imap.port = port;
        }
        if self.no_ssl {
            imap.security = Security::Plain;
        }
        if self.starttls {
            imap.security = Security::StartTls;
        }
        if let Some(timeout) = self.timeout {
            imap.timeout_secs = timeout;
        }
        if self.password.is_some() || self.password_file.is_some() || self.password_env.is_some() {
            imap.auth = PasswordSource {
                password_insecure: self.password.clone(),
                password_file: self.password_file.clone(),
                password_env_var: self.password_env.clone(),
            };
        }

        let dedupe = &mut config.dedupe;
        if let Some(mailbox) = &self.mailbox {
            dedupe.mailbox = mailbox.clone();
        }
        if self.since.is_some() {
            dedupe.since = self.since;
        }
        if self.before.is_some() {
            dedupe.before = self.before;
        }
        if let Some(chunk) = self.chunk {
            dedupe.chunk_size = chunk;
        }
        if let Some(chunk) = self.store_chunk {
            dedupe.store_chunk_size = chunk;
        }
        if let Some(chunk) = self.fetch_flags_chunk {
            dedupe.flags_chunk_size = chunk;
        }
        if let Some(seconds) = self.sleep {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "sleep",
                    reason: format!("{} is not a non-negative number of seconds", seconds),
                });
            }
            dedupe.sleep_ms = (seconds * 1000.0).round() as u64;
        }
        if let Some(criteria) = &self.criteria {
            dedupe.criteria = criteria
                .parse::<FingerprintPolicy>()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: "criteria",
                    reason,
                })?;
        }
        if self.dry_run {
            dedupe.dry_run = true;
        }
        if let Some(interval) = self.expunge_interval {
            dedupe.expunge_interval = interval;
        }
        if let Some(retries) = self.max_retries {
            dedupe.max_retries = retries;
        }

        if let Some(db) = &self.db {
            config.database_path = Some(db.clone());
        }
        Ok(())
    }
}

fn missing(flag: &str) -> ConfigError {
    ConfigError::Validation {
        message: format!("{} is required when no --config file is given", flag),
    }
}
