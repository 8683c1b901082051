// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded bridge database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `sessions`: topic → serialized `Session` (approved/active only)
//! - `client_session`: `"current"` → serialized client-role `Session`
//! - `alerts`: alert id → serialized standing `PriceAlert`
//! - `triggered_alerts`: `!triggered_at|id` → serialized fired `PriceAlert`
//! - `token_metadata`: `chainId:address` → serialized discovered-token entry
//! - `meta`: key → raw bytes (phishing list snapshot, misc state)
//!
//! Every mutation is one write transaction; callers never hold a
//! transaction across an `.await`.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableHandle};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

pub(crate) const SESSIONS: JsonTable = TableDefinition::new("sessions");
pub(crate) const CLIENT_SESSION: JsonTable = TableDefinition::new("client_session");
pub(crate) const ALERTS: JsonTable = TableDefinition::new("alerts");
pub(crate) const TRIGGERED_ALERTS: JsonTable = TableDefinition::new("triggered_alerts");
pub(crate) const TOKEN_METADATA: JsonTable = TableDefinition::new("token_metadata");
pub(crate) const META: JsonTable = TableDefinition::new("meta");

const ALL_TABLES: [JsonTable; 6] = [
    SESSIONS,
    CLIENT_SESSION,
    ALERTS,
    TRIGGERED_ALERTS,
    TOKEN_METADATA,
    META,
];

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Puts and removes on one table, see [`BridgeDatabase::batch_all`].
pub(crate) struct TableOps<'a> {
    pub table: JsonTable,
    pub puts: &'a [(String, Vec<u8>)],
    pub removes: &'a [String],
}

// =============================================================================
// BridgeDatabase
// =============================================================================

/// Embedded ACID store shared by every bridge component.
pub struct BridgeDatabase {
    db: Database,
}

impl BridgeDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        for table in ALL_TABLES {
            let _ = write_txn.open_table(table)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Generic JSON helpers
    // =========================================================================

    pub(crate) fn put_json<T: Serialize>(
        &self,
        table: JsonTable,
        key: &str,
        value: &T,
    ) -> StoreResult<()> {
        let json = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut t = write_txn.open_table(table)?;
            t.insert(key, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(table)?;
        match t.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Remove a key. Returns whether it existed.
    pub(crate) fn remove(&self, table: JsonTable, key: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = write_txn.open_table(table)?.remove(key)?.is_some();
        write_txn.commit()?;
        Ok(existed)
    }

    /// All values of a table in key order. Malformed rows are skipped.
    pub(crate) fn list_json<T: DeserializeOwned>(&self, table: JsonTable) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(table)?;
        let mut out = Vec::new();
        for entry in t.iter()? {
            let (key, value) = entry?;
            match serde_json::from_slice(value.value()) {
                Ok(item) => out.push(item),
                Err(e) => tracing::warn!(
                    table = table.name(),
                    key = key.value(),
                    error = %e,
                    "Skipping malformed row"
                ),
            }
        }
        Ok(out)
    }

    /// All keys of a table in key order.
    pub(crate) fn keys(&self, table: JsonTable) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(table)?;
        let mut out = Vec::new();
        for entry in t.iter()? {
            let (key, _) = entry?;
            out.push(key.value().to_string());
        }
        Ok(out)
    }

    /// Read-modify-write of a single row inside one write transaction.
    ///
    /// Returns the updated value, or `None` if the key does not exist.
    pub(crate) fn update_json<T, F>(
        &self,
        table: JsonTable,
        key: &str,
        mutate: F,
    ) -> StoreResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut t = write_txn.open_table(table)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = match t.get(key)? {
                Some(existing) => Some(existing.value().to_vec()),
                None => None,
            };

            match existing_bytes {
                Some(bytes) => {
                    let mut value: T = serde_json::from_slice(&bytes)?;
                    mutate(&mut value);
                    let json = serde_json::to_vec(&value)?;
                    t.insert(key, json.as_slice())?;
                    Some(value)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Apply several puts and removes to one table atomically.
    pub(crate) fn batch(
        &self,
        table: JsonTable,
        puts: &[(String, Vec<u8>)],
        removes: &[String],
    ) -> StoreResult<()> {
        self.batch_all(&[TableOps {
            table,
            puts,
            removes,
        }])
    }

    /// Apply puts and removes on several tables in one write transaction.
    pub(crate) fn batch_all(&self, ops: &[TableOps<'_>]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        for op in ops {
            let mut t = write_txn.open_table(op.table)?;
            for (key, value) in op.puts {
                t.insert(key.as_str(), value.as_slice())?;
            }
            for key in op.removes {
                t.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Raw meta values
    // =========================================================================

    pub fn put_meta(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut t = write_txn.open_table(META)?;
            t.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(META)?;
        Ok(t.get(key)?.map(|v| v.value().to_vec()))
    }
}

/// Newest-first sort key: inverted millisecond timestamp, then id.
pub(crate) fn newest_first_key(timestamp_millis: i64, id: &str) -> String {
    format!("{:016x}|{id}", !(timestamp_millis as u64))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    pub(crate) fn temp_db() -> (BridgeDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = BridgeDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        count: u32,
    }

    fn row(name: &str, count: u32) -> Row {
        Row {
            name: name.to_string(),
            count,
        }
    }

    #[test]
    fn put_get_remove() {
        let (db, _dir) = temp_db();
        db.put_json(SESSIONS, "a", &row("a", 1)).unwrap();

        let back: Option<Row> = db.get_json(SESSIONS, "a").unwrap();
        assert_eq!(back, Some(row("a", 1)));

        assert!(db.remove(SESSIONS, "a").unwrap());
        assert!(!db.remove(SESSIONS, "a").unwrap());
        assert!(db.get_json::<Row>(SESSIONS, "a").unwrap().is_none());
    }

    #[test]
    fn update_is_read_modify_write() {
        let (db, _dir) = temp_db();
        db.put_json(ALERTS, "x", &row("x", 1)).unwrap();

        let updated = db
            .update_json::<Row, _>(ALERTS, "x", |r| r.count += 41)
            .unwrap();
        assert_eq!(updated.unwrap().count, 42);

        let missing = db.update_json::<Row, _>(ALERTS, "nope", |r| r.count = 0).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn list_skips_malformed_rows() {
        let (db, _dir) = temp_db();
        db.put_json(TOKEN_METADATA, "1", &row("one", 1)).unwrap();
        db.batch(
            TOKEN_METADATA,
            &[("2".to_string(), b"not json".to_vec())],
            &[],
        )
        .unwrap();

        let rows: Vec<Row> = db.list_json(TOKEN_METADATA).unwrap();
        assert_eq!(rows, vec![row("one", 1)]);
        assert_eq!(db.keys(TOKEN_METADATA).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn batch_all_commits_every_table() {
        let (db, _dir) = temp_db();
        db.put_json(ALERTS, "old", &row("old", 1)).unwrap();
        let alert = serde_json::to_vec(&row("a", 2)).unwrap();

        db.batch_all(&[
            TableOps {
                table: ALERTS,
                puts: &[("a".to_string(), alert.clone())],
                removes: &["old".to_string()],
            },
            TableOps {
                table: TRIGGERED_ALERTS,
                puts: &[("h".to_string(), alert)],
                removes: &[],
            },
        ])
        .unwrap();

        assert_eq!(db.keys(ALERTS).unwrap(), vec!["a"]);
        assert_eq!(
            db.get_json::<Row>(TRIGGERED_ALERTS, "h").unwrap(),
            Some(row("a", 2))
        );
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.redb");
        {
            let db = BridgeDatabase::open(&path).unwrap();
            db.put_meta("phishing", b"snapshot").unwrap();
        }
        let db = BridgeDatabase::open(&path).unwrap();
        assert_eq!(db.get_meta("phishing").unwrap(), Some(b"snapshot".to_vec()));
    }

    #[test]
    fn newest_first_ordering() {
        let old = newest_first_key(1_000, "a");
        let new = newest_first_key(2_000, "b");
        assert!(new < old, "Newer timestamps should sort first");
    }
}
