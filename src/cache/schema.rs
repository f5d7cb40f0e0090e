//! Persistent store schema and additive migrations.
//!
//! Version history (`PRAGMA user_version`):
//!
//! * **1**: `analyses` keyed by unique `exact_digest`.
//! * **2**: nullable, indexed `subject_name` column, backfilled from each
//!   stored record.
//!
//! Migrations only ever add columns and indexes, so an older database can be
//! opened in place.

use rusqlite::{params, Connection, Transaction};

use super::database::{normalize_subject, StorageResult, UNKNOWN_SUBJECT};

/// Schema version written after all migrations ran.
pub const SCHEMA_VERSION: i64 = 2;

/// Base table as created by version 1.
pub const BASE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS analyses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  exact_digest TEXT NOT NULL UNIQUE,
  record_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at);
"#;

const SUBJECT_INDEX_DDL: &str =
    "CREATE INDEX IF NOT EXISTS idx_analyses_subject_name ON analyses(subject_name)";

/// Bring the schema up to [`SCHEMA_VERSION`] inside one transaction.
pub fn migrate(conn: &mut Connection) -> StorageResult<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(BASE_DDL)?;

    if !has_column(&tx, "analyses", "subject_name")? {
        log::info!("Migrating analysis store: adding subject_name column");
        tx.execute("ALTER TABLE analyses ADD COLUMN subject_name TEXT", [])?;
        let (filled, unknown) = backfill_subjects(&tx)?;
        log::info!(
            "Backfilled subject_name for {} rows ({} unparseable)",
            filled,
            unknown
        );
    }
    tx.execute(SUBJECT_INDEX_DDL, [])?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

/// Current `user_version` of the database.
pub fn schema_version(conn: &Connection) -> StorageResult<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> StorageResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Fill `subject_name` from each row's stored record.
///
/// Rows whose record cannot be parsed get [`UNKNOWN_SUBJECT`] instead of
/// aborting the migration. Returns `(rows updated, rows marked unknown)`.
fn backfill_subjects(tx: &Transaction<'_>) -> StorageResult<(usize, usize)> {
    let rows: Vec<(i64, String)> = {
        let mut stmt = tx.prepare("SELECT id, record_json FROM analyses")?;
        let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        mapped.collect::<Result<_, _>>()?
    };

    let mut unknown = 0;
    let mut update = tx.prepare("UPDATE analyses SET subject_name = ?1 WHERE id = ?2")?;
    for (id, json) in &rows {
        let subject = serde_json::from_str::<serde_json::Value>(json)
            .ok()
            .and_then(|v| v.get("subject_name")?.as_str().map(normalize_subject))
            .filter(|s| !s.is_empty());
        let subject = match subject {
            Some(s) => s,
            None => {
                log::debug!("Row {} has no parseable subject; marking unknown", id);
                unknown += 1;
                UNKNOWN_SUBJECT.to_string()
            }
        };
        update.execute(params![subject, id])?;
    }
    Ok((rows.len(), unknown))
}
