//! Signature distance and ranked similarity search.
//!
//! The search is a linear scan. That is fine for the capacity-bounded local
//! tier; a large shared store would need an indexed nearest-neighbour
//! structure instead.

use chrono::{DateTime, Utc};

use super::perceptual::Signature;

/// Anything that can be ranked by the similarity search.
pub trait SimilarityCandidate {
    /// The candidate's fingerprint, if one was computed.
    fn signature(&self) -> Option<&Signature>;
    /// When the candidate was created (used to break distance ties).
    fn created_at(&self) -> DateTime<Utc>;
}

/// Character-position distance between two signatures.
///
/// Counts mismatching positions over the shared prefix and adds the
/// length difference as a penalty, so truncated signatures read as
/// dissimilar rather than failing.
#[must_use]
pub fn signature_distance(a: &Signature, b: &Signature) -> u32 {
    let a: Vec<char> = a.as_str().chars().collect();
    let b: Vec<char> = b.as_str().chars().collect();

    let mismatches = a.iter().zip(b.iter()).filter(|(x, y)| x != y).count();
    let penalty = a.len().abs_diff(b.len());
    (mismatches + penalty) as u32
}

/// Find the candidates closest to `signature`.
///
/// Keeps candidates with `distance <= threshold`, sorted ascending by
/// distance; ties go to the most recent candidate, then to input order.
/// At most `limit` results are returned. Candidates without a signature are
/// skipped.
pub fn find_similar<'a, T, I>(
    signature: &Signature,
    candidates: I,
    threshold: u32,
    limit: usize,
) -> Vec<(u32, &'a T)>
where
    T: SimilarityCandidate + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut ranked: Vec<(u32, usize, &'a T)> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(order, candidate)| {
            let distance = signature_distance(signature, candidate.signature()?);
            (distance <= threshold).then_some((distance, order, candidate))
        })
        .collect();

    ranked.sort_by(|(da, oa, a), (db, ob, b)| {
        da.cmp(db)
            .then_with(|| b.created_at().cmp(&a.created_at()))
            .then_with(|| oa.cmp(ob))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|(distance, _, candidate)| (distance, candidate))
        .collect()
}
