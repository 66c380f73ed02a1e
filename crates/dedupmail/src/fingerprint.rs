//! Stable content fingerprints for duplicate detection.
//!
//! A fingerprint is the lowercase hex SHA-256 of a normalized basis string
//! built from a message's header fields and size. Equal fingerprints mean
//! the messages are treated as copies of each other.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Header fields and size read from a message, used as fingerprint input.
///
/// Absent headers are represented by empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderDigestInput {
    pub message_id: String,
    pub date: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// RFC822 size in bytes.
    pub size: u64,
}

/// Which header fields identify a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintPolicy {
    /// Use the Message-ID when present, otherwise the composite of the other fields.
    #[default]
    MsgidFirst,
    /// Ignore Message-ID and always use the composite.
    CompositeOnly,
}

impl FingerprintPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintPolicy::MsgidFirst => "msgid_first",
            FingerprintPolicy::CompositeOnly => "composite_only",
        }
    }
}

impl fmt::Display for FingerprintPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FingerprintPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msgid_first" => Ok(FingerprintPolicy::MsgidFirst),
            "composite_only" => Ok(FingerprintPolicy::CompositeOnly),
            other => Err(format!(
                "unknown fingerprint policy '{}' (expected msgid_first or composite_only)",
                other
            )),
        }
    }
}

/// A fixed-length digest identifying a message for dedup purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a digest read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of `input` under `policy`.
pub fn fingerprint(input: &HeaderDigestInput, policy: FingerprintPolicy) -> Fingerprint {
    let basis = match policy {
        FingerprintPolicy::MsgidFirst => {
            let message_id = normalize(&input.message_id);
            if message_id.is_empty() {
                composite_basis(input)
            } else {
                format!("MID:{}", message_id)
            }
        }
        FingerprintPolicy::CompositeOnly => composite_basis(input),
    };

    let digest = Sha256::digest(basis.as_bytes());
    Fingerprint(format!("{:x}", digest))
}

fn composite_basis(input: &HeaderDigestInput) -> String {
    [
        format!("F:{}", normalize(&input.from)),
        format!("T:{}", normalize(&input.to)),
        format!("S:{}", normalize(&input.subject)),
        format!("D:{}", normalize(&input.date)),
        format!("Z:{}", input.size),
    ]
    .join("|")
}

/// Trims, case-folds and collapses whitespace runs to a single space.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
