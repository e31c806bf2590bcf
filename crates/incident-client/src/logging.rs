//! Process logging setup for the incident-watch binary.

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use incident_core::config::LoggingConfig;
use incident_core::BoardError;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. Console output is compact text
/// or JSON per `logging.format`; a non-empty `logging.file` adds a JSON file
/// layer whose writer is flushed when the returned guard drops. A subscriber
/// that is already installed is left in place.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, BoardError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let json_console = config.format == "json";
    let compact_layer = (!json_console).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let json_layer = json_console.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .with_span_list(false)
    });

    let (file_layer, guard) = match file_target(&config.file) {
        Some((dir, name)) => {
            fs::create_dir_all(&dir).map_err(|err| BoardError::Config {
                message: format!("log directory {}: {err}", dir.display()),
            })?;
            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(false)
                .with_span_list(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(compact_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .ok();

    Ok(guard)
}

/// Split a configured log file path into its directory and file name.
pub fn file_target(path: &str) -> Option<(PathBuf, String)> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = Path::new(trimmed);
    let name = path.file_name()?.to_str()?.to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, name))
}
