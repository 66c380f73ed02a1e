use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Checks the invariants deserialization cannot express.
///
/// The dedupe section is checked by [`PipelineConfig::validate`]. Called
/// again after command-line overrides have been applied.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let imap = &config.imap;
    if imap.host.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "imap.host",
            reason: "must not be empty".to_string(),
        });
    }
    if imap.username.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "imap.username",
            reason: "must not be empty".to_string(),
        });
    }
    if imap.port == 0 {
        return Err(ConfigError::InvalidValue {
            field: "imap.port",
            reason: "must be between 1 and 65535".to_string(),
        });
    }
    if imap.timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "imap.timeoutSecs",
            reason: "must be positive".to_string(),
        });
    }
    if imap.reconnect_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            field: "imap.reconnectAttempts",
            reason: "must be at least 1".to_string(),
        });
    }

    PipelineConfig::from_config(config).validate()
}
