//! Logging setup shared by the executables
//!
//! Every line is stamped with the seconds elapsed since the session epoch so
//! it can be matched against the cycle archives. The terminal copy goes to
//! stderr with coloured level tags and the session log file gets the same
//! line with plain tags. Stdout is never written since `mpc_exec` sends its
//! reply frames there.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level};
use std::fmt::Display;
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Log level must be `INFO` or more verbose, found `{0}`")]
    LevelTooQuiet(LevelFilter),

    #[error("Cannot open the session log file: {0}")]
    LogFile(std::io::Error),

    #[error("A logger is already installed: {0}")]
    AlreadyInstalled(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Install the logger for this execution.
///
/// `min_level` of `WARN`, `ERROR` or `OFF` is rejected so that the per-run
/// summaries logged at `INFO` always reach the session log. Only one logger
/// can be installed per process, a second call fails with
/// `AlreadyInstalled`.
pub fn logger_init(
    min_level: LevelFilter,
    session: &session::Session
) -> Result<(), LoggerInitError> {
    check_level(min_level)?;

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFile)?;

    let terminal = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    session::get_elapsed_seconds(),
                    level_colour(record.level()),
                    record.level(),
                    record.target(),
                    message
                )
            ))
        })
        .chain(std::io::stderr());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    session::get_elapsed_seconds(),
                    level_tag(record.level()),
                    record.level(),
                    record.target(),
                    message
                )
            ))
        })
        .chain(log_file);

    fern::Dispatch::new()
        .level(min_level)
        .chain(terminal)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::AlreadyInstalled)?;

    info!("Logging to stderr and {:?} at {:?}", session.log_file_path, min_level);
    info!("Session epoch is {}", session::get_epoch());

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check_level(min_level: LevelFilter) -> Result<(), LoggerInitError> {
    if min_level < Level::Info {
        Err(LoggerInitError::LevelTooQuiet(min_level))
    }
    else {
        Ok(())
    }
}

/// Build one log line. The target is only shown on debug and trace lines.
fn format_line(
    elapsed_s: f64,
    tag: impl Display,
    level: Level,
    target: &str,
    message: impl Display
) -> String {
    if level > Level::Info {
        format!("[{:10.6} {}] {}: {}", elapsed_s, tag, target, message)
    }
    else {
        format!("[{:10.6} {}] {}", elapsed_s, tag, message)
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info  => "INF",
        Level::Warn  => "WRN",
        Level::Error => "ERR"
    }
}

fn level_colour(level: Level) -> ColoredString {
    let tag = level_tag(level);
    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info  => tag.normal(),
        Level::Warn  => tag.yellow(),
        Level::Error => tag.red().bold()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_check_level() {
        for ok in [LevelFilter::Info, LevelFilter::Debug, LevelFilter::Trace] {
            assert!(check_level(ok).is_ok(), "{} rejected", ok);
        }
        for quiet in [LevelFilter::Off, LevelFilter::Error, LevelFilter::Warn] {
            assert!(matches!(
                check_level(quiet),
                Err(LoggerInitError::LevelTooQuiet(l)) if l == quiet
            ));
        }
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(1.5, level_tag(Level::Info), Level::Info, "mpc_exec", "Cycle 3"),
            "[  1.500000 INF] Cycle 3"
        );
        assert_eq!(
            format_line(12.25, level_tag(Level::Debug), Level::Debug, "mpc_lib::nlp", "done"),
            "[ 12.250000 DBG] mpc_lib::nlp: done"
        );
    }

    #[test]
    fn test_plain_tags() {
        let tags: Vec<_> = [Level::Error, Level::Warn, Level::Info, Level::Debug, Level::Trace]
            .iter()
            .map(|l| level_tag(*l))
            .collect();

        assert_eq!(tags, ["ERR", "WRN", "INF", "DBG", "TRC"]);
    }
}
