//! Seen-fingerprint index scoped to one mailbox.

use std::fmt;

use chrono::Utc;
use log::{debug, warn};

use crate::db::seen_repo::{self, SeenEntryRow, SeenLookup};
use crate::db::{Database, DatabaseError};
use crate::fingerprint::Fingerprint;

/// The (mailbox, UIDVALIDITY) pair that UIDs are valid under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexScope {
    pub mailbox: String,
    pub uidvalidity: u32,
}

impl IndexScope {
    pub fn new(mailbox: impl Into<String>, uidvalidity: u32) -> Self {
        Self {
            mailbox: mailbox.into(),
            uidvalidity,
        }
    }
}

impl fmt::Display for IndexScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (UIDVALIDITY={})", self.mailbox, self.uidvalidity)
    }
}

/// Durable fingerprint → first-seen UID map for one mailbox scope.
pub struct SeenIndex {
    db: Database,
    scope: IndexScope,
}

impl SeenIndex {
    /// Opens the index for `scope`.
    ///
    /// Entries recorded under other UIDVALIDITY values for the same mailbox
    /// are left untouched and never consulted; their presence is logged.
    pub fn open(db: Database, scope: IndexScope) -> Result<Self, DatabaseError> {
        let stale = seen_repo::find_stale_uidvalidities(&db, &scope.mailbox, scope.uidvalidity)?;
        if !stale.is_empty() {
            warn!(
                "Mailbox '{}' has index entries for earlier UIDVALIDITY values {:?}; \
                 they are ignored for UIDVALIDITY {}",
                scope.mailbox, stale, scope.uidvalidity
            );
        }
        Ok(Self { db, scope })
    }

    pub fn scope(&self) -> &IndexScope {
        &self.scope
    }

    /// Records `candidate_uid` as first seen for `fingerprint` unless an entry exists.
    pub fn lookup_or_insert(
        &self,
        fingerprint: &Fingerprint,
        candidate_uid: u32,
    ) -> Result<SeenLookup, DatabaseError> {
        let row = SeenEntryRow {
            mailbox: self.scope.mailbox.clone(),
            uidvalidity: self.scope.uidvalidity,
            fingerprint: fingerprint.as_str().to_string(),
            keep_uid: candidate_uid,
            first_seen_at: Utc::now().to_rfc3339(),
        };

        let lookup = seen_repo::lookup_or_insert(&self.db, &row)?;
        if lookup.is_new {
            debug!("Recorded UID {} as keeper of {}", candidate_uid, fingerprint);
        }
        Ok(lookup)
    }

    /// Number of fingerprints recorded in this scope.
    pub fn entry_count(&self) -> Result<u64, DatabaseError> {
        seen_repo::count_by_scope(&self.db, &self.scope.mailbox, self.scope.uidvalidity)
    }
}
