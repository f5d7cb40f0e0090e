//! JSON output for resolved analyses.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "digest": "af1349b9...",
//!   "origin": "local-exact",
//!   "cached": true,
//!   "record": { "subject_name": "Pad Thai", "category": "Thai", "...": "..." }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::coordinator::{PurgeSummary, Resolution};
use crate::record::AnalysisRecord;

/// A resolution in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// BLAKE3 digest of the photo (64 hex characters)
    pub digest: String,
    /// Where the record came from
    pub origin: String,
    /// Whether a full pipeline run was avoided
    pub cached: bool,
    /// The analysis
    pub record: &'a AnalysisRecord,
}

impl<'a> JsonOutput<'a> {
    #[must_use]
    pub fn new(resolution: &'a Resolution) -> Self {
        Self {
            digest: resolution.digest.to_hex(),
            origin: resolution.origin.to_string(),
            cached: resolution.origin.is_cached(),
            record: &resolution.record,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonOutputError> {
        writer.write_all(self.to_json_pretty()?.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// A purge result in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonPurge {
    pub local: usize,
    pub persistent: usize,
    pub total: usize,
}

impl From<PurgeSummary> for JsonPurge {
    fn from(summary: PurgeSummary) -> Self {
        Self {
            local: summary.local,
            persistent: summary.persistent,
            total: summary.total(),
        }
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON output: {0}")]
    Io(#[from] std::io::Error),
}
