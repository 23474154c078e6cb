//! Tracing setup for MiniBit
//!
//! Console logs follow the user-selected level while a trace-level copy of
//! every event is written to disk. Each process of a swarm (tracker, peer 0,
//! peer 1, ...) gets its own log file so runs can be replayed peer by peer.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Initialize tracing with dual output: console (user level) + file (full trace)
///
/// # Arguments
/// * `console_level` - Log level for console output
/// * `logs_dir` - Directory to write trace logs (defaults to "./logs")
/// * `role` - Process role used in the file name, e.g. `tracker` or `peer-3`
///
/// The file `minibit-<role>-last-run.log` is overwritten on every run.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - If logs directory cannot be created or log file cannot be opened for writing
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
    role: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_file_path = log_file_path(logs_dir, role);
    if let Some(parent) = log_file_path.parent() {
        create_dir_all(parent)?;
    }
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false) // No color codes in files
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(
        "Tracing initialized: role={}, console={}, trace_file={}",
        role,
        console_level,
        log_file_path.display()
    );

    Ok(())
}

/// Location of the trace log for one process role.
pub fn log_file_path(logs_dir: Option<&Path>, role: &str) -> PathBuf {
    logs_dir
        .unwrap_or_else(|| Path::new("logs"))
        .join(format!("minibit-{role}-last-run.log"))
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Lifecycle events such as downloads and unchoke rounds
    Info,
    /// Per-connection protocol traffic
    Debug,
    /// Everything
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use minibit_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_named_after_role() {
        let path = log_file_path(Some(Path::new("/tmp/logs")), "peer-3");
        assert_eq!(path, PathBuf::from("/tmp/logs/minibit-peer-3-last-run.log"));

        let default_path = log_file_path(None, "tracker");
        assert_eq!(default_path, PathBuf::from("logs/minibit-tracker-last-run.log"));
    }

    #[test]
    fn test_cli_levels_map_to_tracing_levels() {
        assert_eq!(CliLogLevel::Error.as_tracing_level(), Level::ERROR);
        assert_eq!(CliLogLevel::Warn.as_tracing_level(), Level::WARN);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
    }
}
