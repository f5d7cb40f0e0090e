//! Logging setup for the platelens binary.
//!
//! The library only emits through the `log` facade. The binary installs an
//! `env_logger` backend whose level is chosen, in priority order, by:
//!
//! 1. `RUST_LOG`, when set
//! 2. `-q` (errors only) or `-v`/`-vv` (debug/trace)
//! 3. info otherwise
//!
//! Debug builds print a timestamp and, when verbose, the module path.
//! Release builds print level and message only.
//!
//! # Example
//!
//! ```rust,no_run
//! use platelens::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("cache lookups will be traced");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Install the global logger.
///
/// # Panics
///
/// Panics if a logger is already installed.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").is_ok();
    let mut builder = Builder::new();

    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
        // HTTP internals are noisy below trace
        if verbose < 2 {
            builder.filter_module("hyper", LevelFilter::Warn);
            builder.filter_module("reqwest", LevelFilter::Warn);
            builder.filter_module("rustls", LevelFilter::Warn);
        }
    }

    configure_format(&mut builder, verbose);
    builder.init();

    if from_env {
        log::debug!("Log filter taken from RUST_LOG={:?}", env::var("RUST_LOG").ok());
    } else {
        log::debug!("Log level {:?}", determine_level(verbose, quiet));
    }
}

/// Map CLI flags to a level. `quiet` wins over `verbose`.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let ts = buf.timestamp_seconds();
            let style = buf.default_level_style(record.level());
            if verbose >= 1 {
                writeln!(
                    buf,
                    "{} {style}{:<5}{style:#} [{}] {}",
                    ts,
                    record.level(),
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} {style}{:<5}{style:#} {}",
                    ts,
                    record.level(),
                    record.args()
                )
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let style = buf.default_level_style(record.level());
            writeln!(buf, "{style}{:<5}{style:#} {}", record.level(), record.args())
        });
    }
}
