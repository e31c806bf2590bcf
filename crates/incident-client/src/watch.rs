//! `incident-watch`: load the board, follow the push channel and log how
//! the columns change until interrupted.
//!
//! Bootstrap sequence:
//!   1. Parse CLI flags
//!   2. Load configuration (file, environment, flags)
//!   3. Initialize logging
//!   4. Load the board over REST
//!   5. Pump push events into the session until ctrl-c or channel close

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use incident_board::push::{PumpEnd, PushHub, PushListener, SessionId};
use incident_board::{BoardSession, SessionConfig};
use incident_core::config::BoardConfig;
use incident_core::types::{Column, Incident};
use incident_core::BoardError;

use crate::http::HttpIncidentApi;
use crate::logging::init_logging;
use crate::ws::WsPushSource;

const USAGE: &str = "usage: incident-watch [--config PATH] [--api-url URL] [--log-level LEVEL] [--log-format console|json] [--no-push]";

/// Command-line flags. Empty strings mean "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchArgs {
    pub config_file: String,
    pub api_url: String,
    pub log_level: String,
    pub log_format: String,
    pub no_push: bool,
    pub help: bool,
}

/// Parse flags. Unknown flags and flags missing their value are ignored.
pub fn parse_args<I>(args: I) -> WatchArgs
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = WatchArgs::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(v) = iter.next() {
                    parsed.config_file = v;
                }
            }
            "--api-url" => {
                if let Some(v) = iter.next() {
                    parsed.api_url = v;
                }
            }
            "--log-level" => {
                if let Some(v) = iter.next() {
                    parsed.log_level = v;
                }
            }
            "--log-format" => {
                if let Some(v) = iter.next() {
                    parsed.log_format = v;
                }
            }
            "--no-push" => parsed.no_push = true,
            "-h" | "--help" => parsed.help = true,
            _ => {}
        }
    }
    parsed
}

/// Load configuration and layer the flags on top.
pub fn resolve_config(args: &WatchArgs) -> Result<BoardConfig, BoardError> {
    let path = (!args.config_file.is_empty()).then(|| Path::new(args.config_file.as_str()));
    let mut cfg = BoardConfig::load(path)?;
    if !args.api_url.is_empty() {
        cfg.api.base_url = args.api_url.clone();
    }
    if !args.log_level.is_empty() {
        cfg.logging.level = args.log_level.clone();
    }
    if !args.log_format.is_empty() {
        cfg.logging.format = args.log_format.clone();
    }
    if args.no_push {
        cfg.push.enabled = false;
    }
    cfg.validate()
        .map_err(|message| BoardError::Config { message })?;
    Ok(cfg)
}

/// Entry point for the binary. Returns the process exit code.
pub fn run_from_env() -> i32 {
    run(std::env::args().skip(1))
}

pub fn run<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let args = parse_args(args);
    if args.help {
        println!("{USAGE}");
        return 0;
    }

    let cfg = match resolve_config(&args) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("incident-watch: {err}");
            return 2;
        }
    };
    let _guard = match init_logging(&cfg.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("incident-watch: {err}");
            return 2;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "failed to build runtime");
            return 1;
        }
    };

    match runtime.block_on(watch(cfg)) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "incident-watch stopped");
            1
        }
    }
}

/// Load the board and follow the push channel until ctrl-c.
pub async fn watch(cfg: BoardConfig) -> Result<(), BoardError> {
    let api = Arc::new(HttpIncidentApi::new(&cfg.api)?);
    let session = BoardSession::new(api, SessionConfig::from(&cfg));
    let loaded = session.load().await?;
    tracing::info!(
        base_url = %cfg.api.base_url,
        incidents = loaded,
        "board loaded"
    );
    log_columns(&session);

    let cancel = CancellationToken::new();
    if cfg.push.enabled {
        let mut source = WsPushSource::connect(&cfg.push.url).await?;
        let hub = PushHub::new();
        hub.register(SessionId::new("board"), Arc::new(session.clone()));
        hub.register(
            SessionId::new("summary"),
            Arc::new(ColumnSummary {
                session: session.clone(),
            }),
        );

        let end = tokio::select! {
            end = hub.pump(&mut source, cancel.clone()) => end,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                PumpEnd::Cancelled
            }
        };
        tracing::info!(?end, url = source.url(), "push pump ended");
    } else {
        tracing::info!("push disabled; waiting for ctrl-c");
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
        }
    }

    session.shutdown();
    Ok(())
}

/// Logs column sizes after every push, once the board has applied it.
struct ColumnSummary {
    session: BoardSession,
}

impl PushListener for ColumnSummary {
    fn on_incident(&self, incident: &Incident) {
        tracing::info!(
            incident_id = %incident.id,
            status = %incident.status.as_str(),
            "push received"
        );
        log_columns(&self.session);
    }
}

fn log_columns(session: &BoardSession) {
    let board = session.snapshot();
    tracing::info!(
        triage = board.column(Column::Triage).len(),
        investigating = board.column(Column::Investigating).len(),
        fixing = board.column(Column::Fixing).len(),
        "board columns"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> WatchArgs {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_known_flags() {
        let parsed = args(&[
            "--config",
            "/etc/board.yaml",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--api-url",
            "http://board:8000",
            "--no-push",
        ]);
        assert_eq!(
            parsed,
            WatchArgs {
                config_file: "/etc/board.yaml".into(),
                api_url: "http://board:8000".into(),
                log_level: "debug".into(),
                log_format: "json".into(),
                no_push: true,
                help: false,
            }
        );
    }

    #[test]
    fn unknown_and_dangling_flags_are_ignored() {
        let parsed = args(&["--verbose", "--config"]);
        assert_eq!(parsed, WatchArgs::default());
    }

    #[test]
    fn flags_override_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("board.yaml");
        std::fs::write(&path, "api:\n  base_url: http://from-file:9000\n").unwrap();

        let cfg = resolve_config(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--log-format",
            "json",
            "--no-push",
        ]))
        .unwrap();

        assert_eq!(cfg.api.base_url, "http://from-file:9000");
        assert_eq!(cfg.logging.format, "json");
        assert!(!cfg.push.enabled);
    }

    #[test]
    fn help_exits_cleanly() {
        assert_eq!(run(["--help".to_string()]), 0);
    }
}
