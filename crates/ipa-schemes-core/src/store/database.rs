//! SQLite store for extraction runs.
//!
//! Each run is one batch output from some machine at some time. Runs are
//! kept in insertion order so reconciling them reproduces the first-seen
//! semantics of merging the equivalent JSON files in that order.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::{SchemeError, SchemeResult};
use crate::merge::reconcile::{reconcile, MergeOutcome};
use crate::models::{AppRecord, SchemeIndex};
use crate::store::schema;

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text == "~" || text.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if text.len() > 2 {
                expanded.push(&text[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

fn resolve(path: &Path) -> SchemeResult<PathBuf> {
    let expanded = expand_tilde(path);
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(resolved)
}

/// Stored run metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    pub id: i64,
    pub label: String,
    pub content_hash: String,
    pub record_count: i64,
    pub created_at: i64,
}

pub struct DatasetStore {
    conn: Connection,
}

impl DatasetStore {
    /// Open (creating if needed) a store at `path`.
    pub fn open(path: &Path) -> SchemeResult<Self> {
        let resolved = resolve(path)?;
        Self::from_connection(Connection::open(resolved)?)
    }

    pub fn open_in_memory() -> SchemeResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SchemeResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Persist one run. Scheme-less records are dropped; a run whose content
    /// is already stored is returned as-is instead of being duplicated.
    pub fn save_run(&mut self, label: &str, records: &[AppRecord]) -> SchemeResult<RunInfo> {
        let kept: Vec<&AppRecord> = records.iter().filter(|r| r.has_schemes()).collect();
        let payloads = kept
            .iter()
            .map(|r| serde_json::to_string(r))
            .collect::<Result<Vec<_>, _>>()?;
        let content_hash = content_hash(&payloads);

        if let Some(existing) = self.find_run_by_hash(&content_hash)? {
            tracing::info!(run_id = existing.id, label = %existing.label, "run already stored");
            return Ok(existing);
        }

        let created_at = unix_now();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO runs(label, content_hash, record_count, created_at) VALUES (?1, ?2, ?3, ?4);",
            params![label, content_hash, kept.len() as i64, created_at],
        )?;
        let run_id = tx.last_insert_rowid();
        {
            let mut insert_record = tx.prepare(
                "INSERT INTO run_records(run_id, position, identity_key, item_id, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5);",
            )?;
            let mut insert_scheme = tx.prepare(
                "INSERT OR IGNORE INTO run_schemes(run_id, scheme, item_id) VALUES (?1, ?2, ?3);",
            )?;
            for (position, (record, payload)) in kept.iter().zip(&payloads).enumerate() {
                insert_record.execute(params![
                    run_id,
                    position as i64,
                    record.identity_key(),
                    record.item_id,
                    payload
                ])?;
                for scheme in &record.url_schemes {
                    insert_scheme.execute(params![run_id, scheme, record.item_id])?;
                }
            }
        }
        tx.commit()?;

        tracing::info!(run_id, label, records = kept.len(), "stored run");
        Ok(RunInfo {
            id: run_id,
            label: label.to_string(),
            content_hash,
            record_count: kept.len() as i64,
            created_at,
        })
    }

    fn find_run_by_hash(&self, content_hash: &str) -> SchemeResult<Option<RunInfo>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, label, content_hash, record_count, created_at FROM runs \
                 WHERE content_hash = ?1;",
                params![content_hash],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    pub fn list_runs(&self) -> SchemeResult<Vec<RunInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, label, content_hash, record_count, created_at FROM runs ORDER BY id;",
        )?;
        let runs = stmt
            .query_map([], row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Records of one run in their stored order.
    pub fn load_run(&self, run_id: i64) -> SchemeResult<Vec<AppRecord>> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT id FROM runs WHERE id = ?1;", params![run_id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(SchemeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("run {run_id} does not exist"),
            )));
        }

        let mut stmt = self.conn.prepare(
            "SELECT payload FROM run_records WHERE run_id = ?1 ORDER BY position;",
        )?;
        let payloads = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(SchemeError::from))
            .collect()
    }

    /// Every run, oldest first.
    pub fn load_all_runs(&self) -> SchemeResult<Vec<Vec<AppRecord>>> {
        self.list_runs()?
            .iter()
            .map(|run| self.load_run(run.id))
            .collect()
    }

    pub fn delete_run(&mut self, run_id: i64) -> SchemeResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM runs WHERE id = ?1;", params![run_id])?;
        Ok(deleted > 0)
    }

    /// Reconcile every stored run, oldest first.
    pub fn reconcile_runs(&self) -> SchemeResult<MergeOutcome> {
        Ok(reconcile(&self.load_all_runs()?))
    }

    /// Scheme index across every stored run.
    pub fn scheme_index(&self) -> SchemeResult<SchemeIndex> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT scheme, item_id FROM run_schemes;")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut index = SchemeIndex::new();
        for row in rows {
            let (scheme, item_id) = row?;
            index.entry(scheme).or_default().insert(item_id);
        }
        Ok(index)
    }

    /// Copy the store to `destination` using the SQLite backup API.
    pub fn backup_to(&self, destination: &Path) -> SchemeResult<PathBuf> {
        let resolved = resolve(destination)?;
        let mut dst_conn = Connection::open(&resolved)?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dst_conn)?;
        backup.run_to_completion(100, Duration::from_millis(10), None)?;
        Ok(resolved)
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunInfo> {
    Ok(RunInfo {
        id: row.get(0)?,
        label: row.get(1)?,
        content_hash: row.get(2)?,
        record_count: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn content_hash(payloads: &[String]) -> String {
    let mut hasher = Sha256::new();
    for payload in payloads {
        hasher.update(payload.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
