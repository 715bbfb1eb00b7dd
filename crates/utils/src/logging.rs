//! provides logging helpers

use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Directory (or file path) receiving a rolling copy of the log output.
pub const LOG_PATH_ENV_VAR: &str = "UNITLET_LOG_PATH";

const DEFAULT_LOG_PREFIX: &str = "unitlet.log";

/// Splits a log path into the rotation directory and the file prefix.
///
/// A path pointing at an existing directory keeps the default prefix.
pub fn rotation_target(log_path: &Path) -> (PathBuf, String) {
    if log_path.is_dir() {
        return (log_path.to_path_buf(), DEFAULT_LOG_PREFIX.to_string());
    }
    let parent = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = log_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_PREFIX);
    (parent.to_path_buf(), prefix.to_string())
}

/// initiate the global tracing subscriber
///
/// Logs always go to stderr. When `log_path` is set, a daily rolling file
/// receives the same events; the returned guard must outlive the program's
/// logging.
pub fn init<P: AsRef<Path>>(log_path: Option<P>) -> Option<WorkerGuard> {
    let env_filter = || {
        filter::EnvFilter::builder()
            .with_default_directive(filter::LevelFilter::INFO.into())
            .from_env_lossy()
    };

    let stderr_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let file = log_path.and_then(|path| {
        let (dir, prefix) = rotation_target(path.as_ref());
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .max_log_files(3)
            .build(&dir)
        {
            Ok(appender) => Some(tracing_appender::non_blocking(appender)),
            Err(err) => {
                eprintln!(
                    "failed to create rolling file appender at {}: {err}; logging to stderr only",
                    dir.display()
                );
                None
            }
        }
    });

    match file {
        Some((writer, guard)) => {
            let file_layer = layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            registry().with(stderr_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            registry().with(stderr_layer).init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn rotation_target_for_file_path() {
        let (dir, prefix) = rotation_target(Path::new("/var/log/unitlet/agent.log"));
        assert_eq!(dir, PathBuf::from("/var/log/unitlet"));
        assert_eq!(prefix, "agent.log");
    }

    #[test]
    fn rotation_target_for_existing_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (dir, prefix) = rotation_target(tmp.path());
        assert_eq!(dir, tmp.path().to_path_buf());
        assert_eq!(prefix, DEFAULT_LOG_PREFIX);
    }

    #[test]
    fn rotation_target_for_bare_file_name() {
        let (dir, prefix) = rotation_target(Path::new("agent.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(prefix, "agent.log");
    }
}
