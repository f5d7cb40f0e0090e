//! Tiered resolution of a photo to an analysis record.
//!
//! [`CacheCoordinator::resolve`] checks the cheapest sources first and stops
//! at the first hit:
//!
//! 1. local tier, exact digest
//! 2. local tier, perceptual similarity
//! 3. persistent tier, exact digest
//! 4. persistent tier, model-guessed subject name
//! 5. the full analysis pipeline
//!
//! Anything found below the local tier is written back into it. Only
//! freshly generated records go into the persistent tier.

use std::fmt;

use crate::cache::{
    CacheEntry, CacheTier, EvictionCriteria, LocalTier, PersistentTier, StorageError,
    StorageResult,
};
use crate::imaging::{ContentDigest, ContentHasher, PerceptualFingerprinter, Signature};
use crate::pipeline::{AnalysisPipeline, PipelineError};
use crate::record::AnalysisRecord;

/// Maximum fingerprint distance accepted as a similar photo.
pub const SIMILARITY_THRESHOLD: u32 = 5;

/// Maximum number of similar candidates considered.
pub const SIMILARITY_LIMIT: usize = 5;

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Same bytes seen before by this caller.
    LocalExact,
    /// A visually similar photo seen before by this caller.
    LocalSimilar,
    /// Same bytes stored in the shared store.
    RemoteExact,
    /// Same dish stored in the shared store.
    RemoteSemantic,
    /// Freshly produced by the pipeline.
    Generated,
}

impl Origin {
    /// True when no full pipeline run was needed.
    #[must_use]
    pub fn is_cached(self) -> bool {
        !matches!(self, Self::Generated)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LocalExact => "local-exact",
            Self::LocalSimilar => "local-similar",
            Self::RemoteExact => "remote-exact",
            Self::RemoteSemantic => "remote-semantic",
            Self::Generated => "generated",
        };
        f.write_str(s)
    }
}

/// A successfully resolved photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: AnalysisRecord,
    pub origin: Origin,
    /// Digest of the submitted bytes.
    pub digest: ContentDigest,
}

/// Counts removed by a purge, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub local: usize,
    pub persistent: usize,
}

impl PurgeSummary {
    /// Entries removed across both tiers.
    #[must_use]
    pub fn total(&self) -> usize {
        self.local + self.persistent
    }
}

/// Public entry point tying both cache tiers to the pipeline.
///
/// The local tier is owned here, so `resolve` takes `&mut self`. The
/// persistent tier is a shared handle and may be cloned into other
/// coordinators.
pub struct CacheCoordinator {
    local: LocalTier,
    persistent: PersistentTier,
    pipeline: AnalysisPipeline,
    hasher: ContentHasher,
    fingerprinter: PerceptualFingerprinter,
}

impl fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("local_entries", &self.local.len())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl CacheCoordinator {
    /// Create a coordinator over the given tiers and pipeline.
    pub fn new(local: LocalTier, persistent: PersistentTier, pipeline: AnalysisPipeline) -> Self {
        Self {
            local,
            persistent,
            pipeline,
            hasher: ContentHasher::new(),
            fingerprinter: PerceptualFingerprinter::new(),
        }
    }

    /// Resolve `image` to an analysis record.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error when every cache misses and the
    /// pipeline fails. [`PipelineError::NotFood`] is a rejection and is not
    /// cached; the other variants are retryable.
    pub async fn resolve(&mut self, image: &[u8]) -> Result<Resolution, PipelineError> {
        if let Some(removed) = self.local.run_scheduled_cleanup() {
            log::debug!("Daily cleanup removed {} local entries", removed);
        }

        let fingerprint = match self.fingerprinter.fingerprint(image) {
            Ok(sig) => Some(sig),
            Err(e) => {
                log::debug!("No fingerprint, similarity lookup skipped: {}", e);
                None
            }
        };
        let digest = self.hasher.digest(image);
        log::debug!("Resolving {} ({} bytes)", digest, image.len());

        if let Some(entry) = self.local.lookup_exact(&digest) {
            log::debug!("Local exact hit for {}", digest);
            return Ok(resolution(entry.record.clone(), Origin::LocalExact, digest));
        }

        if let Some(sig) = &fingerprint {
            let best = self
                .local
                .lookup_similar(sig, SIMILARITY_THRESHOLD, SIMILARITY_LIMIT)
                .first()
                .map(|entry| entry.record.clone());
            if let Some(record) = best {
                log::debug!("Local similarity hit for {}", digest);
                self.remember(digest, fingerprint.clone(), &record);
                return Ok(resolution(record, Origin::LocalSimilar, digest));
            }
        }

        let fetched = self.on_store(move |store| Ok(store.fetch(&digest))).await;
        if let Ok(Some(record)) = fetched {
            log::debug!("Persistent exact hit for {}", digest);
            self.remember(digest, fingerprint, &record);
            return Ok(resolution(record, Origin::RemoteExact, digest));
        }

        if let Some(record) = self.semantic_lookup(image).await {
            log::debug!("Persistent semantic hit for {}", digest);
            self.remember(digest, fingerprint, &record);
            return Ok(resolution(record, Origin::RemoteSemantic, digest));
        }

        let record = self.pipeline.run(image).await?;
        log::info!("Generated analysis for '{}'", record.subject_name);
        let (subject, stored) = (record.subject_name.clone(), record.clone());
        let put = self
            .on_store(move |store| store.put(&digest, &subject, &stored))
            .await;
        if let Err(e) = put {
            log::warn!("Could not store analysis for {}: {}", digest, e);
        }
        self.remember(digest, fingerprint, &record);
        Ok(resolution(record, Origin::Generated, digest))
    }

    async fn semantic_lookup(&self, image: &[u8]) -> Option<AnalysisRecord> {
        let subject = match self.pipeline.guess_subject(image).await {
            Ok(Some(subject)) => subject,
            Ok(None) => return None,
            Err(e) => {
                log::info!("Subject guess skipped: {}", e);
                return None;
            }
        };
        let key = subject.clone();
        match self
            .on_store(move |store| store.lookup_by_subject(&key))
            .await
        {
            Ok(found) => found.map(|entry| entry.record),
            Err(e) => {
                log::warn!("Subject lookup for '{}' failed: {}", subject, e);
                None
            }
        }
    }

    /// Run blocking store I/O on tokio's blocking pool.
    async fn on_store<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(PersistentTier) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.persistent.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| StorageError::Blocking(e.to_string()))?
    }

    fn remember(
        &mut self,
        digest: ContentDigest,
        fingerprint: Option<Signature>,
        record: &AnalysisRecord,
    ) {
        self.local
            .put(CacheEntry::new(digest, fingerprint, record.clone()));
    }

    /// Remove everything from both tiers.
    pub fn purge_all(&mut self) -> StorageResult<PurgeSummary> {
        let local = self.local.clear();
        let persistent = self.persistent.delete_all()?;
        Ok(PurgeSummary { local, persistent })
    }

    /// Remove entries older than `days` from both tiers.
    pub fn purge_older_than(&mut self, days: u32) -> StorageResult<PurgeSummary> {
        let local = self
            .local
            .evict_by_criteria(&EvictionCriteria::default().older_than_days(days));
        let persistent = self.persistent.delete_older_than(days)?;
        Ok(PurgeSummary { local, persistent })
    }

    /// Remove entries of category `name` (case-insensitive) from both tiers.
    pub fn purge_by_category(&mut self, name: &str) -> StorageResult<PurgeSummary> {
        let local = self
            .local
            .evict_by_criteria(&EvictionCriteria::default().category(name));
        let persistent = self.persistent.delete_by_category(name)?;
        Ok(PurgeSummary { local, persistent })
    }

    /// Remove entries above `threshold` calories from both tiers.
    pub fn purge_above_calories(&mut self, threshold: f64) -> StorageResult<PurgeSummary> {
        let local = self
            .local
            .evict_by_criteria(&EvictionCriteria::default().calories_above(threshold));
        let persistent = self.persistent.delete_by_calories_above(threshold)?;
        Ok(PurgeSummary { local, persistent })
    }

    /// The local tier.
    #[must_use]
    pub fn local(&self) -> &LocalTier {
        &self.local
    }

    /// The persistent tier.
    #[must_use]
    pub fn persistent(&self) -> &PersistentTier {
        &self.persistent
    }
}

fn resolution(record: AnalysisRecord, origin: Origin, digest: ContentDigest) -> Resolution {
    Resolution {
        record,
        origin,
        digest,
    }
}
