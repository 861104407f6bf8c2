//! Global logging configuration.
//!
//! A thin wrapper over `tracing-subscriber` so callers configure logging
//! once with the same two knobs the parser options expose: a level
//! (`info|debug|warn|error|fatal`) and a path (`stdout` or a file).
//!
//! Library code logs through the `tracing` macros; every absorbed
//! evaluation error (workflow mismatch, type mismatch, render error,
//! non-boolean output) is reported at `warn` so a misbehaving rule is
//! visible without poisoning the batch.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;

use crate::error::Error;

/// Install the global subscriber with the given `level` and `path`.
///
/// `level` is one of `info|debug|warn|error|fatal` (`fatal` is folded into
/// `error`: tracing has no fatal level). `path` is `stdout` or a file path
/// opened for append. Calling this more than once is harmless: the first
/// configuration wins.
pub fn init(level: &str, path: &str) -> Result<(), Error> {
    let filter = match level {
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" | "fatal" => LevelFilter::ERROR,
        other => return Err(Error::Log(format!("level not supported: {other}"))),
    };

    let builder = fmt().with_max_level(filter).with_target(false);

    let installed = match path {
        "stdout" => builder.try_init().is_ok(),
        file_path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|e| Error::Log(format!("failed to log to file {file_path}: {e}")))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init().is_ok()
        }
    };

    if !installed {
        tracing::debug!("logging already initialized; keeping existing configuration");
    }
    Ok(())
}
