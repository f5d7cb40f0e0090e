//! SQLite-backed persistent analysis store.
//!
//! The persistent tier is shared by every caller. Rows are keyed by the
//! unique exact digest (writes are upserts, so concurrent writers for the
//! same image converge on one row) and carry a normalized subject name used
//! for the looser semantic lookup.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use unicode_normalization::UnicodeNormalization;

use super::entry::PersistedEntry;
use super::schema;
use super::CacheTier;
use crate::imaging::ContentDigest;
use crate::record::AnalysisRecord;

/// Subject stored for rows whose record could not be parsed.
pub const UNKNOWN_SUBJECT: &str = "unknown";

/// Shortest query accepted by the loose subject match.
pub const MIN_LOOSE_QUERY_CHARS: usize = 3;

/// Most recent rows examined by the loose subject match.
pub const LOOSE_MATCH_SCAN_LIMIT: usize = 64;

/// Errors that can occur in the persistent store.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// An SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record failed to serialize or deserialize.
    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value that cannot be interpreted.
    #[error("Corrupt row {id}: {reason}")]
    CorruptRow {
        /// Row id
        id: i64,
        /// What was wrong
        reason: String,
    },

    /// The connection mutex was poisoned by a panicking writer.
    #[error("Database connection lock poisoned")]
    LockPoisoned,

    /// Creating the database directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A store call on the blocking pool panicked or was cancelled.
    #[error("Blocking store task failed: {0}")]
    Blocking(String),
}

/// Result alias for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Normalize a subject name into its lookup key.
///
/// Applies Unicode NFC, trims, collapses internal whitespace and lowercases.
#[must_use]
pub fn normalize_subject(name: &str) -> String {
    let nfc: String = name.nfc().collect();
    nfc.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

type RawRow = (i64, String, Option<String>, String, String);

const SELECT_COLUMNS: &str = "SELECT id, exact_digest, subject_name, record_json, created_at FROM analyses";

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_row((id, digest, subject_name, json, created_at): RawRow) -> StorageResult<PersistedEntry> {
    let exact_digest = digest.parse::<ContentDigest>().map_err(|e| StorageError::CorruptRow {
        id,
        reason: e.to_string(),
    })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StorageError::CorruptRow {
            id,
            reason: format!("bad timestamp: {}", e),
        })?
        .with_timezone(&Utc);
    let record: AnalysisRecord = serde_json::from_str(&json)?;
    Ok(PersistedEntry {
        id,
        exact_digest,
        subject_name,
        record,
        created_at,
    })
}

/// Durable analysis store shared across callers.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct PersistentTier {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for PersistentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentTier")
            .field("conn", &"<sqlite>")
            .finish()
    }
}

impl PersistentTier {
    /// Opens or creates the store at `path`, running migrations.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("Opened analysis store {} (journal_mode={})", path.display(), mode);
        Self::from_connection(conn)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> StorageResult<Self> {
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Current schema version.
    pub fn schema_version(&self) -> StorageResult<i64> {
        schema::schema_version(&*self.lock()?)
    }

    /// Look up a row by exact digest.
    pub fn lookup_exact(&self, digest: &ContentDigest) -> StorageResult<Option<PersistedEntry>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("{} WHERE exact_digest = ?1", SELECT_COLUMNS),
                params![digest.to_hex()],
                read_row,
            )
            .optional()?;
        raw.map(decode_row).transpose()
    }

    /// Look up the most recent row for a subject name.
    ///
    /// Tries a case-insensitive exact match first, then a bounded loose
    /// match over recent rows whose subject starts with the query or
    /// contains it as a whole word.
    pub fn lookup_by_subject(&self, name: &str) -> StorageResult<Option<PersistedEntry>> {
        let key = normalize_subject(name);
        if key.is_empty() || key == UNKNOWN_SUBJECT {
            return Ok(None);
        }

        let conn = self.lock()?;
        let exact = conn
            .query_row(
                &format!(
                    "{} WHERE subject_name = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                    SELECT_COLUMNS
                ),
                params![key],
                read_row,
            )
            .optional()?;
        if let Some(raw) = exact {
            log::debug!("Exact subject match for '{}'", key);
            return decode_row(raw).map(Some);
        }

        if key.chars().count() < MIN_LOOSE_QUERY_CHARS {
            return Ok(None);
        }

        let whole_word = Regex::new(&format!(r"\b{}\b", regex::escape(&key)))
            .map_err(|e| StorageError::CorruptRow {
                id: 0,
                reason: format!("subject pattern: {}", e),
            })?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE subject_name LIKE ?1 ESCAPE '\\' AND subject_name <> ?2 \
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            SELECT_COLUMNS
        ))?;
        let pattern = format!("%{}%", escape_like(&key));
        let rows = stmt.query_map(
            params![pattern, UNKNOWN_SUBJECT, LOOSE_MATCH_SCAN_LIMIT as i64],
            read_row,
        )?;

        for raw in rows {
            let raw = raw?;
            let subject = raw.2.as_deref().unwrap_or_default();
            if subject.starts_with(&key) || whole_word.is_match(subject) {
                log::debug!("Loose subject match '{}' for '{}'", subject, key);
                return decode_row(raw).map(Some);
            }
        }
        Ok(None)
    }

    /// Insert or replace the row for `digest`.
    pub fn put(
        &self,
        digest: &ContentDigest,
        subject_name: &str,
        record: &AnalysisRecord,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(record)?;
        let subject = match normalize_subject(subject_name) {
            s if s.is_empty() => UNKNOWN_SUBJECT.to_string(),
            s => s,
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO analyses(exact_digest, subject_name, record_json, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(exact_digest) DO UPDATE SET
                subject_name=excluded.subject_name,
                record_json=excluded.record_json,
                created_at=excluded.created_at",
            params![digest.to_hex(), subject, json, timestamp(Utc::now())],
        )?;
        Ok(())
    }

    /// Delete every row. Returns the count deleted.
    pub fn delete_all(&self) -> StorageResult<usize> {
        Ok(self.lock()?.execute("DELETE FROM analyses", [])?)
    }

    /// Delete rows older than `days`. Returns the count deleted.
    pub fn delete_older_than(&self, days: u32) -> StorageResult<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        Ok(self.lock()?.execute(
            "DELETE FROM analyses WHERE created_at < ?1",
            params![timestamp(cutoff)],
        )?)
    }

    /// Delete rows whose record category matches `name` (case-insensitive).
    pub fn delete_by_category(&self, name: &str) -> StorageResult<usize> {
        Ok(self.lock()?.execute(
            "DELETE FROM analyses
             WHERE lower(trim(json_extract(record_json, '$.category'))) = ?1",
            params![name.trim().to_lowercase()],
        )?)
    }

    /// Delete rows whose calories exceed `threshold`.
    pub fn delete_by_calories_above(&self, threshold: f64) -> StorageResult<usize> {
        Ok(self.lock()?.execute(
            "DELETE FROM analyses
             WHERE CAST(json_extract(record_json, '$.nutrition.calories') AS REAL) > ?1",
            params![threshold],
        )?)
    }

    /// Total number of rows.
    pub fn count(&self) -> StorageResult<usize> {
        let n: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Number of rows stored for `digest` (0 or 1).
    pub fn count_for_digest(&self, digest: &ContentDigest) -> StorageResult<usize> {
        let n: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM analyses WHERE exact_digest = ?1",
            params![digest.to_hex()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl CacheTier for PersistentTier {
    fn name(&self) -> &'static str {
        "persistent"
    }

    fn fetch(&self, digest: &ContentDigest) -> Option<AnalysisRecord> {
        match self.lookup_exact(digest) {
            Ok(entry) => entry.map(|e| e.record),
            Err(e) => {
                log::warn!("Persistent lookup for {} failed: {}", digest, e);
                None
            }
        }
    }
}
