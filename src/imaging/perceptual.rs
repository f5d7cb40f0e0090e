//! Perceptual image fingerprints for near-duplicate detection.
//!
//! A fingerprint is a mean hash of the photo: the image is reduced to an
//! 8×8 grayscale grid by area resampling and each bit records whether a cell
//! is brighter than the grid's mean. Compression noise averages out over a
//! cell, so re-encoding or resizing a photo moves at most a few characters of
//! the signature, while unrelated dishes differ in most positions.

use image::imageops::FilterType;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Width and height of the hash grid, in bits.
pub const HASH_GRID: u32 = 8;

/// Number of characters in a signature: 64 hash bits in unpadded base64.
pub const SIGNATURE_LEN: usize = 11;

/// Errors that can occur while fingerprinting.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes could not be decoded as a supported image.
    #[error("Failed to decode image: {0}")]
    Undecodable(#[source] image::ImageError),

    /// The image decoded but has no pixels.
    #[error("Image has zero width or height")]
    Empty,
}

/// A perceptual signature of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Wrap an already-encoded signature string.
    ///
    /// No validation is applied; signatures of unexpected length are still
    /// comparable (the length difference counts as distance).
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The encoded signature.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Character length of the signature.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Returns true for an empty signature.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes perceptual fingerprints for encoded images.
pub struct PerceptualFingerprinter {
    hasher: image_hasher::Hasher,
}

impl PerceptualFingerprinter {
    /// Create a fingerprinter using the mean hash over a triangle-filtered
    /// grid.
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(HASH_GRID, HASH_GRID)
            .hash_alg(HashAlg::Mean)
            .resize_filter(FilterType::Triangle)
            .to_hasher();
        Self { hasher }
    }

    /// Fingerprint encoded image bytes (PNG, JPEG, GIF, BMP or WebP).
    pub fn fingerprint(&self, bytes: &[u8]) -> Result<Signature, DecodeError> {
        let img = image::load_from_memory(bytes).map_err(DecodeError::Undecodable)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(DecodeError::Empty);
        }

        let hash = self.hasher.hash_image(&img);
        Ok(Signature(hash.to_base64()))
    }
}

impl Default for PerceptualFingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sniff the MIME type of encoded image bytes, if recognizable.
#[must_use]
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}
