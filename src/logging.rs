//! Tracing configuration and log routing.
//!
//! Logs go to stdout using a compact formatter and to the file named by the configuration
//! (`DOCSUMMARIZER_LOG_FILE`, default `logs/docsummarizer.log`). File writes go through a
//! non-blocking worker; a file that cannot be opened leaves stdout logging in place.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Appends to `log_file`, creating its directory when missing.
/// - Keeps the non-blocking writer guard alive for the process lifetime.
pub fn init_tracing(log_file: &Path) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match file_writer(log_file) {
        Some((writer, guard)) => {
            let _ = LOG_GUARD.set(guard);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Open `path` for appending behind a non-blocking writer.
fn file_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    let Some(file_name) = path.file_name() else {
        eprintln!("Log file path {} has no file name", path.display());
        return None;
    };
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {}: {err}", dir.display());
        return None;
    }
    match RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
    {
        Ok(appender) => Some(tracing_appender::non_blocking(appender)),
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_writer_creates_directory_and_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("service.log");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "earlier\n").expect("seed log");

        let (mut writer, guard) = file_writer(&path).expect("writer");
        writer.write_all(b"later\n").expect("write");
        drop(guard);

        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(contents, "earlier\nlater\n");
    }

    #[test]
    fn file_writer_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a").join("b").join("service.log");

        let (_writer, guard) = file_writer(&path).expect("writer");
        drop(guard);

        assert!(path.parent().expect("parent").is_dir());
    }

    #[test]
    fn path_without_file_name_is_rejected() {
        assert!(file_writer(Path::new("/")).is_none());
    }
}
