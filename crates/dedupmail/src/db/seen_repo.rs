//! Seen-fingerprint repository: operations on the `seen_fingerprints` table.
//!
//! Rows are insert-only: the first UID recorded for a fingerprint within a
//! (mailbox, UIDVALIDITY) scope is never replaced.

use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};

use super::{Database, DatabaseError};

/// A raw seen-fingerprint row.
#[derive(Debug, Clone)]
pub struct SeenEntryRow {
    pub mailbox: String,
    pub uidvalidity: u32,
    pub fingerprint: String,
    pub keep_uid: u32,
    pub first_seen_at: String,
}

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeenLookup {
    /// True when this call created the entry.
    pub is_new: bool,
    /// The UID recorded as first seen (the candidate when `is_new`).
    pub recorded_uid: u32,
}

/// Inserts `row` unless an entry for its scope and fingerprint exists.
///
/// Runs inside an IMMEDIATE transaction so the insert and the read-back
/// are atomic with respect to other connections on the same file.
pub fn lookup_or_insert(db: &Database, row: &SeenEntryRow) -> Result<SeenLookup, DatabaseError> {
    db.with_conn(|conn| {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO seen_fingerprints
                (mailbox, uidvalidity, fingerprint, keep_uid, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.mailbox,
                row.uidvalidity,
                row.fingerprint,
                row.keep_uid,
                row.first_seen_at,
            ],
        )?;

        let lookup = if inserted == 1 {
            SeenLookup {
                is_new: true,
                recorded_uid: row.keep_uid,
            }
        } else {
            let recorded: Option<u32> = tx
                .query_row(
                    "SELECT keep_uid FROM seen_fingerprints
                     WHERE mailbox = ?1 AND uidvalidity = ?2 AND fingerprint = ?3",
                    params![row.mailbox, row.uidvalidity, row.fingerprint],
                    |r| r.get(0),
                )
                .optional()?;
            let recorded_uid = recorded.ok_or_else(|| DatabaseError::EntryVanished {
                mailbox: row.mailbox.clone(),
                fingerprint: row.fingerprint.clone(),
            })?;
            SeenLookup {
                is_new: false,
                recorded_uid,
            }
        };

        tx.commit()?;
        Ok(lookup)
    })
}

/// Finds the UID recorded as first seen for a fingerprint, if any.
pub fn find_keep_uid(
    db: &Database,
    mailbox: &str,
    uidvalidity: u32,
    fingerprint: &str,
) -> Result<Option<u32>, DatabaseError> {
    db.with_conn(|conn| {
        let uid = conn
            .query_row(
                "SELECT keep_uid FROM seen_fingerprints
                 WHERE mailbox = ?1 AND uidvalidity = ?2 AND fingerprint = ?3",
                params![mailbox, uidvalidity, fingerprint],
                |r| r.get(0),
            )
            .optional()?;
        Ok(uid)
    })
}

/// Counts entries recorded for a mailbox under one UIDVALIDITY.
pub fn count_by_scope(db: &Database, mailbox: &str, uidvalidity: u32) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM seen_fingerprints WHERE mailbox = ?1 AND uidvalidity = ?2",
            params![mailbox, uidvalidity],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Returns the UIDVALIDITY values other than `current` that have entries for `mailbox`.
pub fn find_stale_uidvalidities(
    db: &Database,
    mailbox: &str,
    current: u32,
) -> Result<Vec<u32>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT uidvalidity FROM seen_fingerprints
             WHERE mailbox = ?1 AND uidvalidity != ?2
             ORDER BY uidvalidity",
        )?;
        let values = stmt
            .query_map(params![mailbox, current], |r| r.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    })
}

/// Deletes every entry for a mailbox, across all UIDVALIDITY values.
/// Returns the number of rows deleted.
pub fn delete_by_mailbox(db: &Database, mailbox: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "DELETE FROM seen_fingerprints WHERE mailbox = ?1",
            params![mailbox],
        )?;
        Ok(count as u64)
    })
}
