//! Logging infrastructure.
//!
//! Structured file logging with daily rotation to platform-standard
//! directories. Stdout carries the chunk stream, so nothing is logged there.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

const LOG_FILE_PREFIX: &str = "agent-chunks";
const RETENTION_DAYS: u64 = 7;

/// Result of initializing the logging system.
pub struct LoggingContext {
    /// Must be held for the program lifetime so buffered logs are flushed.
    pub _guard: WorkerGuard,
    /// Random id of this run, attached to the start log line.
    pub run_id: String,
    pub log_directory: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to determine log directory")]
    NoLogDirectory,
    #[error("failed to create log directory {path:?}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install log subscriber: {0}")]
    Subscriber(String),
}

/// Generates a 6-character random hex run id.
fn generate_run_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 3] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Platform log directory.
///
/// macOS: ~/Library/Logs/agent-chunks/
/// Linux: ~/.local/state/agent-chunks/
/// Windows: %LocalAppData%\agent-chunks\
fn log_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Logs").join(LOG_FILE_PREFIX))
    } else {
        let project_dirs = ProjectDirs::from("dev", "agent-chunks", "agent-chunks")?;
        project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .or_else(|| Some(project_dirs.data_local_dir().to_path_buf()))
    }
}

/// Initializes the global subscriber.
///
/// `AGENT_CHUNKS_LOG` takes precedence over `level` when it holds a valid
/// filter directive. The returned guard must be held for the program
/// lifetime.
pub fn init(level: &str) -> Result<LoggingContext, LoggingError> {
    let run_id = generate_run_id();

    let log_dir = log_dir().ok_or(LoggingError::NoLogDirectory)?;
    fs::create_dir_all(&log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.clone(),
        source,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_env("AGENT_CHUNKS_LOG")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    info!(run_id = %run_id, "run_start");

    Ok(LoggingContext {
        _guard: guard,
        run_id,
        log_directory: log_dir,
    })
}

/// Deletes `agent-chunks.*` log files older than the retention period.
/// Failures are logged and never stop startup.
pub fn cleanup_old_logs(log_dir: &Path) {
    cleanup_logs_older_than(
        log_dir,
        Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60),
        SystemTime::now(),
    );
}

fn cleanup_logs_older_than(log_dir: &Path, retention: Duration, now: SystemTime) -> u32 {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "log_dir_read_failed");
            return 0;
        }
    };

    let prefix = format!("{}.", LOG_FILE_PREFIX);
    let mut deleted_count = 0u32;

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if name.starts_with(&prefix) => name.to_string(),
            _ => continue,
        };

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %file_name, error = %e, "log_file_metadata_failed");
                continue;
            }
        };

        // Files dated in the future are left alone.
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };

        if age > retention {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %file_name, age_days = age.as_secs() / 86400, "old_log_deleted");
                    deleted_count += 1;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "old_log_delete_failed");
                }
            }
        }
    }

    if deleted_count > 0 {
        debug!(count = deleted_count, "log_cleanup_completed");
    }
    deleted_count
}
