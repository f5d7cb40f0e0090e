//! Command-line interface definitions for platelens.
//!
//! # Example
//!
//! ```bash
//! # Analyze a photo, printing a summary
//! platelens analyze dinner.jpg
//!
//! # Machine-readable output
//! platelens analyze dinner.jpg --output json
//!
//! # Drop cached analyses older than two weeks
//! platelens purge --older-than 14
//!
//! # Debug logging
//! platelens -v analyze dinner.jpg
//! ```

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Dish photo analysis with tiered result caching.
///
/// platelens identifies the dish in a photo, returns its recipe and
/// nutrition, and caches the result so repeated or similar photos are
/// answered without another model call.
#[derive(Debug, Parser)]
#[command(name = "platelens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (TOML)
    ///
    /// Defaults to config.toml in the platform config directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a dish photo
    Analyze(AnalyzeArgs),
    /// Remove cached analyses from both tiers
    Purge(PurgeArgs),
    /// Show cache statistics
    Stats,
}

/// Arguments for the analyze subcommand.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Photo to analyze
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the purge subcommand. Exactly one selector is required.
#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("selector")
        .required(true)
        .args(["all", "older_than", "category", "above_calories"]),
))]
pub struct PurgeArgs {
    /// Remove everything
    #[arg(long)]
    pub all: bool,

    /// Remove analyses older than this many days
    #[arg(long, value_name = "DAYS")]
    pub older_than: Option<u32>,

    /// Remove analyses of this category (case-insensitive)
    #[arg(long, value_name = "NAME")]
    pub category: Option<String>,

    /// Remove analyses above this many calories
    #[arg(long, value_name = "KCAL", value_parser = parse_calories)]
    pub above_calories: Option<f64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Output format for analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a non-negative calorie threshold.
///
/// # Examples
///
/// ```
/// use platelens::cli::parse_calories;
///
/// assert_eq!(parse_calories("650").unwrap(), 650.0);
/// assert_eq!(parse_calories("812.5kcal").unwrap(), 812.5);
/// assert!(parse_calories("-1").is_err());
/// ```
///
/// # Errors
///
/// Returns an error for empty, non-numeric, negative or non-finite input.
pub fn parse_calories(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let num_str = s
        .strip_suffix("kcal")
        .or_else(|| s.strip_suffix("KCAL"))
        .unwrap_or(s)
        .trim();
    if num_str.is_empty() {
        return Err("Calories cannot be empty".to_string());
    }
    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;
    if !num.is_finite() || num < 0.0 {
        return Err("Calories must be a non-negative number".to_string());
    }
    Ok(num)
}
