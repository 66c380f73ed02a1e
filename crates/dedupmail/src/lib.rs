pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod pipeline;
pub mod secrets;
pub mod transport;

pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, DedupeError, Result};
pub use fingerprint::{fingerprint, Fingerprint, FingerprintPolicy, HeaderDigestInput};
pub use index::{IndexScope, SeenIndex};
pub use pipeline::{CancelToken, Pipeline, PipelineConfig, RunOutcome, RunReport, RunSummary};
pub use secrets::{resolve_secret, SecretError};
pub use transport::{ImapTransport, MailboxTransport, TransportError};
