//! Cache entry definitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::imaging::{ContentDigest, Signature, SimilarityCandidate};
use crate::record::AnalysisRecord;

/// Represents a single analysis held by the local tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Digest of the exact image bytes.
    pub exact_digest: ContentDigest,
    /// Perceptual fingerprint, absent when the image could not be decoded.
    pub fingerprint: Option<Signature>,
    /// The cached analysis.
    pub record: AnalysisRecord,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(
        exact_digest: ContentDigest,
        fingerprint: Option<Signature>,
        record: AnalysisRecord,
    ) -> Self {
        Self {
            exact_digest,
            fingerprint,
            record,
            created_at: Utc::now(),
        }
    }

    /// Age of the entry relative to `now`.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }

    /// Whether the entry is older than `max_age_days` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_age_days: u32) -> bool {
        self.age_at(now) > Duration::days(i64::from(max_age_days))
    }
}

impl SimilarityCandidate for CacheEntry {
    fn signature(&self) -> Option<&Signature> {
        self.fingerprint.as_ref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A row of the persistent tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    /// Row id.
    pub id: i64,
    /// Digest of the exact image bytes (unique).
    pub exact_digest: ContentDigest,
    /// Normalized subject name used for semantic lookup.
    pub subject_name: Option<String>,
    /// The stored analysis.
    pub record: AnalysisRecord,
    /// When the row was last written.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ContentHasher;
    use crate::record::fixtures::sample_record;

    #[test]
    fn test_entry_expiry() {
        let digest = ContentHasher::new().digest(b"a");
        let mut entry = CacheEntry::new(digest, None, sample_record("Soup", "French", 300.0));
        let now = Utc::now();
        assert!(!entry.is_expired_at(now, 30));

        entry.created_at = now - Duration::days(31);
        assert!(entry.is_expired_at(now, 30));
        assert!(entry.age_at(now) >= Duration::days(31));
    }
}
