//! Analysis caching tiers.
//!
//! Two independently owned tiers hold copies of the same analysis records:
//!
//! * [`local`]: a bounded, time-expiring cache owned by one caller, queried
//!   by exact digest and by perceptual similarity.
//! * [`database`]: a durable SQLite store shared by all callers, queried by
//!   exact digest and by normalized subject name.
//!
//! Supporting modules:
//!
//! * [`entry`]: the entry types each tier stores.
//! * [`schema`]: persistent schema creation and additive migrations.
//!
//! # Synchronization
//!
//! Tiers never copy from each other. Freshly generated or remotely fetched
//! records are written through into the faster tier by the coordinator.

pub mod database;
pub mod entry;
pub mod local;
pub mod schema;

pub use database::{normalize_subject, PersistentTier, StorageError, StorageResult};
pub use entry::{CacheEntry, PersistedEntry};
pub use local::{EvictionCriteria, LocalTier, LocalTierConfig, LocalTierStats, SnapshotError};

use crate::imaging::ContentDigest;
use crate::record::AnalysisRecord;

/// Exact-digest lookup shared by every tier.
///
/// Implementations absorb their own storage failures: a broken tier reads
/// as a miss.
pub trait CacheTier {
    /// Short tier name for logs.
    fn name(&self) -> &'static str;

    /// Fetch the record stored for `digest`, if any.
    fn fetch(&self, digest: &ContentDigest) -> Option<AnalysisRecord>;
}
