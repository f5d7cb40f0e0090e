//! Image keying: exact content digests and perceptual fingerprints.
//!
//! This module provides functionality for:
//! - Content hashing with BLAKE3 (byte-identical matches)
//! - Perceptual fingerprinting with a mean hash (near-duplicate matches)
//! - Ranked similarity search over fingerprints
//!
//! # Architecture
//!
//! - [`hasher`]: BLAKE3 content digests
//! - [`perceptual`]: Perceptual signatures and image decoding
//! - [`similarity`]: Signature distance and ranked candidate search
//!
//! # Example
//!
//! ```
//! use platelens::imaging::{signature_distance, ContentHasher, Signature};
//!
//! let digest = ContentHasher::new().digest(b"raw image bytes");
//! assert_eq!(digest.to_hex().len(), 64);
//!
//! let a = Signature::new("AAAAAAAAAAA");
//! let b = Signature::new("AAAAAAAAAAB");
//! assert_eq!(signature_distance(&a, &b), 1);
//! ```

pub mod hasher;
pub mod perceptual;
pub mod similarity;

pub use hasher::{ContentDigest, ContentHasher, DigestParseError, DIGEST_LEN};
pub use perceptual::{sniff_mime_type, DecodeError, PerceptualFingerprinter, Signature};
pub use similarity::{find_similar, signature_distance, SimilarityCandidate};
