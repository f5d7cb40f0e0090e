//! Output formatters for analyses.
//!
//! - [`text`]: colored human-readable summary
//! - [`json`]: machine-readable output for scripting
//!
//! # Example
//!
//! ```no_run
//! use platelens::coordinator::Resolution;
//! use platelens::output::JsonOutput;
//!
//! fn print(resolution: &Resolution) {
//!     let mut stdout = std::io::stdout();
//!     JsonOutput::new(resolution).write_to(&mut stdout).unwrap();
//! }
//! ```

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError, JsonPurge};
pub use text::{write_purge, write_stats, TextOutput};
