use super::support::record;
use platelens::cache::schema::SCHEMA_VERSION;
use platelens::cache::{CacheTier, PersistentTier};
use platelens::imaging::ContentHasher;
use rusqlite::{params, Connection};
use std::thread;
use tempfile::tempdir;

#[test]
fn test_rows_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("analyses.db");
    let digest = ContentHasher::new().digest(b"photo");

    {
        let store = PersistentTier::open(&path).unwrap();
        store
            .put(&digest, "Chicken Satay", &record("Chicken Satay", "Thai", 540.0))
            .unwrap();
    }

    let store = PersistentTier::open(&path).unwrap();
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    let entry = store.lookup_exact(&digest).unwrap().unwrap();
    assert_eq!(entry.record.subject_name, "Chicken Satay");
    assert_eq!(store.fetch(&digest).unwrap().category, "Thai");
    assert_eq!(store.name(), "persistent");
}

#[test]
fn test_concurrent_writes_for_one_digest_are_idempotent() {
    let dir = tempdir().unwrap();
    let store = PersistentTier::open(&dir.path().join("analyses.db")).unwrap();
    let digest = ContentHasher::new().digest(b"same photo");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let rec = record("Nasi Goreng", "Indonesian", 500.0 + f64::from(i));
                store.put(&digest, "Nasi Goreng", &rec).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.count_for_digest(&digest).unwrap(), 1);
    assert_eq!(store.count().unwrap(), 1);
    let kcal = store.lookup_exact(&digest).unwrap().unwrap().record.nutrition.calories;
    assert!((500.0..508.0).contains(&kcal));
}

#[test]
fn test_legacy_store_is_migrated_and_searchable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    let good = ContentHasher::new().digest(b"good");
    let bad = ContentHasher::new().digest(b"bad");

    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE analyses (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               exact_digest TEXT NOT NULL UNIQUE,
               record_json TEXT NOT NULL,
               created_at TEXT NOT NULL
             );",
        )
        .unwrap();
        let json = serde_json::to_string(&record("Green  Curry", "Thai", 610.0)).unwrap();
        conn.execute(
            "INSERT INTO analyses(exact_digest, record_json, created_at) VALUES (?1, ?2, ?3)",
            params![good.to_hex(), json, "2024-01-01T00:00:00.000Z"],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO analyses(exact_digest, record_json, created_at) VALUES (?1, ?2, ?3)",
            params![bad.to_hex(), "{not json", "2024-01-02T00:00:00.000Z"],
        )
        .unwrap();
    }

    let store = PersistentTier::open(&path).unwrap();
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    assert_eq!(store.count().unwrap(), 2);

    let hit = store.lookup_by_subject("green curry").unwrap().unwrap();
    assert_eq!(hit.exact_digest, good);
    assert_eq!(hit.subject_name.as_deref(), Some("green curry"));
    // the unparseable row is kept but never matches
    assert!(store.lookup_by_subject("unknown").unwrap().is_none());
}

#[test]
fn test_admin_deletes_by_category_and_calories() {
    let store = PersistentTier::open_in_memory().unwrap();
    let hasher = ContentHasher::new();
    store
        .put(&hasher.digest(b"1"), "Pho", &record("Pho", "Vietnamese", 450.0))
        .unwrap();
    store
        .put(&hasher.digest(b"2"), "Banh Mi", &record("Banh Mi", "vietnamese", 700.0))
        .unwrap();
    store
        .put(&hasher.digest(b"3"), "Poutine", &record("Poutine", "Canadian", 900.0))
        .unwrap();

    assert_eq!(store.delete_by_calories_above(800.0).unwrap(), 1);
    assert_eq!(store.delete_by_category("  VIETNAMESE ").unwrap(), 2);
    assert_eq!(store.count().unwrap(), 0);
    assert_eq!(store.delete_all().unwrap(), 0);
}
