//! Caller-owned local cache tier.
//!
//! The local tier is a small, bounded, time-expiring cache that belongs to a
//! single caller (one coordinator). It answers exact-digest lookups and
//! perceptual similarity queries without any external I/O.
//!
//! # Bounds
//!
//! * **Capacity**: after every insert, the oldest entries beyond
//!   `capacity` are evicted.
//! * **Age**: entries older than `max_age_days` are invisible to lookups and
//!   removed by [`LocalTier::evict_expired`], which runs when the tier is
//!   opened and at most once a day through
//!   [`LocalTier::run_scheduled_cleanup`].
//!
//! # Snapshots
//!
//! A tier may be backed by a JSON snapshot file so a session survives
//! restarts. Each snapshot is wrapped in an envelope carrying a SHA-256
//! checksum and is limited to `quota_bytes`. Any storage failure resets the
//! tier to empty; the tier never fails its caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::entry::CacheEntry;
use super::CacheTier;
use crate::imaging::{find_similar, ContentDigest, Signature};
use crate::record::AnalysisRecord;

/// Current version of the snapshot file format.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Minimum spacing between scheduled cleanups.
pub const CLEANUP_INTERVAL_HOURS: i64 = 24;

/// Configuration for a local tier.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTierConfig {
    /// Maximum number of entries kept.
    pub capacity: usize,
    /// Entries older than this many days expire.
    pub max_age_days: u32,
    /// Optional snapshot file.
    pub snapshot_path: Option<PathBuf>,
    /// Maximum serialized snapshot size in bytes.
    pub quota_bytes: usize,
}

impl Default for LocalTierConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            max_age_days: 30,
            snapshot_path: None,
            quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl LocalTierConfig {
    /// Set the capacity ceiling.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set the expiry age in days.
    #[must_use]
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// Back the tier with a snapshot file.
    #[must_use]
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Set the snapshot size quota.
    #[must_use]
    pub fn with_quota_bytes(mut self, bytes: usize) -> Self {
        self.quota_bytes = bytes;
        self
    }
}

/// Errors raised by snapshot storage. They never escape the tier.
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    /// Serialization or parsing failed.
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing the file failed.
    #[error("Snapshot I/O error for {path}: {source}")]
    Io {
        /// Snapshot path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The serialized snapshot is larger than the quota.
    #[error("Snapshot of {size} bytes exceeds quota of {quota} bytes")]
    QuotaExceeded {
        /// Serialized size
        size: usize,
        /// Configured quota
        quota: usize,
    },

    /// The checksum did not match the contents.
    #[error("Snapshot checksum mismatch")]
    ChecksumMismatch,

    /// The snapshot was written by an unsupported format version.
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    last_cleanup: Option<DateTime<Utc>>,
    entries: Vec<CacheEntry>,
}

/// The snapshot stays raw JSON so the checksum covers the exact bytes written.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    checksum: String,
    snapshot: Box<RawValue>,
}

fn checksum(snapshot_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snapshot_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Criteria for bulk eviction. All set conditions must hold; an empty
/// criteria set matches nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvictionCriteria {
    /// Match entries older than this many days.
    pub older_than_days: Option<u32>,
    /// Match entries whose record category equals this (case-insensitive).
    pub category: Option<String>,
    /// Match entries whose calories exceed this value.
    pub calories_above: Option<f64>,
}

impl EvictionCriteria {
    /// Match by age.
    #[must_use]
    pub fn older_than_days(mut self, days: u32) -> Self {
        self.older_than_days = Some(days);
        self
    }

    /// Match by category.
    #[must_use]
    pub fn category(mut self, name: impl Into<String>) -> Self {
        self.category = Some(name.into());
        self
    }

    /// Match by calorie count.
    #[must_use]
    pub fn calories_above(mut self, threshold: f64) -> Self {
        self.calories_above = Some(threshold);
        self
    }

    /// Returns true if no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.older_than_days.is_none() && self.category.is_none() && self.calories_above.is_none()
    }

    /// Whether `entry` matches at `now`.
    #[must_use]
    pub fn matches(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        if self.is_empty() {
            return false;
        }
        let age_ok = self
            .older_than_days
            .map_or(true, |days| entry.is_expired_at(now, days));
        let category_ok = self
            .category
            .as_deref()
            .map_or(true, |c| entry.record.category.eq_ignore_ascii_case(c.trim()));
        let calories_ok = self
            .calories_above
            .map_or(true, |t| entry.record.nutrition.calories > t);
        age_ok && category_ok && calories_ok
    }
}

/// Summary of a local tier's contents.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTierStats {
    /// Number of entries held, expired or not.
    pub entries: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Entries that carry a perceptual fingerprint.
    pub fingerprinted: usize,
    /// Creation time of the oldest entry.
    pub oldest: Option<DateTime<Utc>>,
    /// Time of the last expiry sweep.
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// Bounded, time-expiring local cache.
#[derive(Debug)]
pub struct LocalTier {
    config: LocalTierConfig,
    entries: Vec<CacheEntry>,
    last_cleanup: Option<DateTime<Utc>>,
}

impl LocalTier {
    /// Open a tier, loading its snapshot (if configured) and sweeping
    /// expired entries.
    ///
    /// Never fails: an unreadable snapshot yields an empty tier.
    pub fn open(config: LocalTierConfig) -> Self {
        let mut tier = Self {
            config,
            entries: Vec::new(),
            last_cleanup: None,
        };

        if let Some(path) = tier.config.snapshot_path.clone() {
            match load_snapshot(&path) {
                Ok(Some(snapshot)) => {
                    log::debug!(
                        "Loaded {} local cache entries from {}",
                        snapshot.entries.len(),
                        path.display()
                    );
                    tier.entries = snapshot.entries;
                    tier.last_cleanup = snapshot.last_cleanup;
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Discarding local cache snapshot {}: {}", path.display(), e);
                }
            }
        }

        let max_age = tier.config.max_age_days;
        let removed = tier.evict_expired(max_age);
        if removed > 0 {
            log::info!("Removed {} expired local cache entries", removed);
        }
        tier
    }

    /// An in-memory tier with no snapshot.
    #[must_use]
    pub fn in_memory(capacity: usize, max_age_days: u32) -> Self {
        Self::open(
            LocalTierConfig::default()
                .with_capacity(capacity)
                .with_max_age_days(max_age_days),
        )
    }

    /// Look up a live entry by exact digest.
    #[must_use]
    pub fn lookup_exact(&self, digest: &ContentDigest) -> Option<&CacheEntry> {
        let now = Utc::now();
        self.live_entries(now).find(|e| &e.exact_digest == digest)
    }

    /// Live entries whose fingerprint lies within `threshold`, best first.
    #[must_use]
    pub fn lookup_similar(
        &self,
        signature: &Signature,
        threshold: u32,
        limit: usize,
    ) -> Vec<&CacheEntry> {
        let now = Utc::now();
        find_similar(signature, self.live_entries(now), threshold, limit)
            .into_iter()
            .map(|(distance, entry)| {
                log::trace!(
                    "Similar local entry {} at distance {}",
                    entry.exact_digest,
                    distance
                );
                entry
            })
            .collect()
    }

    /// Insert or replace an entry by exact digest, then enforce capacity.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.retain(|e| e.exact_digest != entry.exact_digest);
        self.entries.push(entry);

        while self.entries.len() > self.config.capacity {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => {
                    let evicted = self.entries.remove(i);
                    log::trace!("Capacity eviction of {}", evicted.exact_digest);
                }
                None => break,
            }
        }
        self.persist();
    }

    /// Remove entries older than `max_age_days`. Returns the count removed.
    pub fn evict_expired(&mut self, max_age_days: u32) -> usize {
        let now = Utc::now();
        let removed = self.remove_expired(now, max_age_days);
        self.last_cleanup = Some(now);
        self.persist();
        removed
    }

    /// Sweep expired entries if the last sweep is at least a day old.
    ///
    /// Returns `Some(count)` when a sweep ran.
    pub fn run_scheduled_cleanup(&mut self) -> Option<usize> {
        let now = Utc::now();
        let due = self
            .last_cleanup
            .map_or(true, |at| now - at >= Duration::hours(CLEANUP_INTERVAL_HOURS));
        if !due {
            return None;
        }
        let max_age = self.config.max_age_days;
        let removed = self.evict_expired(max_age);
        log::debug!("Scheduled local cleanup removed {} entries", removed);
        Some(removed)
    }

    /// Remove all entries matching `criteria`. Returns the count removed.
    pub fn evict_by_criteria(&mut self, criteria: &EvictionCriteria) -> usize {
        let now = Utc::now();
        self.evict_where(|entry| criteria.matches(entry, now))
    }

    /// Remove all entries for which `predicate` returns true.
    pub fn evict_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|e| !predicate(e));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Remove every entry. Returns the count removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.persist();
        removed
    }

    /// Number of entries held (including not-yet-swept expired ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tier holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time of the last expiry sweep.
    #[must_use]
    pub fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        self.last_cleanup
    }

    /// Summarize the tier.
    #[must_use]
    pub fn stats(&self) -> LocalTierStats {
        LocalTierStats {
            entries: self.entries.len(),
            capacity: self.config.capacity,
            fingerprinted: self.entries.iter().filter(|e| e.fingerprint.is_some()).count(),
            oldest: self.entries.iter().map(|e| e.created_at).min(),
            last_cleanup: self.last_cleanup,
        }
    }

    fn live_entries(&self, now: DateTime<Utc>) -> impl Iterator<Item = &CacheEntry> {
        let max_age = self.config.max_age_days;
        self.entries.iter().filter(move |e| !e.is_expired_at(now, max_age))
    }

    fn remove_expired(&mut self, now: DateTime<Utc>, max_age_days: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.is_expired_at(now, max_age_days));
        before - self.entries.len()
    }

    /// Write the snapshot, absorbing failures.
    ///
    /// Quota exhaustion gets one retry after an expiry sweep; anything else,
    /// or a second failure, resets the tier.
    fn persist(&mut self) {
        let Some(path) = self.config.snapshot_path.clone() else {
            return;
        };

        let err = match self.write_snapshot(&path) {
            Ok(()) => return,
            Err(e) => e,
        };

        if matches!(err, SnapshotError::QuotaExceeded { .. }) {
            log::debug!("{}; sweeping expired entries and retrying", err);
            let max_age = self.config.max_age_days;
            self.remove_expired(Utc::now(), max_age);
            match self.write_snapshot(&path) {
                Ok(()) => return,
                Err(e) => log::warn!("Local cache write failed after retry: {}", e),
            }
        } else {
            log::warn!("Local cache write failed: {}", err);
        }

        self.reset(&path);
    }

    fn write_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            last_cleanup: self.last_cleanup,
            entries: self.entries.clone(),
        };
        let snapshot_json = serde_json::to_string(&snapshot)?;
        let envelope = SnapshotEnvelope {
            checksum: checksum(&snapshot_json),
            snapshot: RawValue::from_string(snapshot_json)?,
        };
        let json = serde_json::to_string(&envelope)?;

        if json.len() > self.config.quota_bytes {
            return Err(SnapshotError::QuotaExceeded {
                size: json.len(),
                quota: self.config.quota_bytes,
            });
        }

        let io_err = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json.as_bytes()).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    fn reset(&mut self, path: &Path) {
        log::warn!("Resetting local cache ({} entries dropped)", self.entries.len());
        self.entries.clear();
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                log::debug!("Could not remove snapshot {}: {}", path.display(), e);
            }
        }
    }
}

impl CacheTier for LocalTier {
    fn name(&self) -> &'static str {
        "local"
    }

    fn fetch(&self, digest: &ContentDigest) -> Option<AnalysisRecord> {
        self.lookup_exact(digest).map(|e| e.record.clone())
    }
}

fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let envelope: SnapshotEnvelope = serde_json::from_str(&content)?;

    if checksum(envelope.snapshot.get()) != envelope.checksum {
        return Err(SnapshotError::ChecksumMismatch);
    }
    let snapshot: Snapshot = serde_json::from_str(envelope.snapshot.get())?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(snapshot.version));
    }
    Ok(Some(snapshot))
}
