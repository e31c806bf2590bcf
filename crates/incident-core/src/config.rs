//! Configuration for the incident board client.
//!
//! Root configuration struct and nested section types with full defaults,
//! validation, YAML file loading, environment variable overrides, and tilde
//! path expansion.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::BoardError;

pub const ENV_API_URL: &str = "INCIDENT_BOARD_API_URL";
pub const ENV_PUSH_URL: &str = "INCIDENT_BOARD_PUSH_URL";
pub const ENV_LOG_LEVEL: &str = "INCIDENT_BOARD_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "INCIDENT_BOARD_LOG_FORMAT";

const CONFIG_FILE_NAME: &str = "config.yaml";
const CONFIG_DIR_NAME: &str = "incident-board";

// ---------------------------------------------------------------------------
// Root config
// ---------------------------------------------------------------------------

/// Root configuration for the incident board client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardConfig {
    pub api: ApiConfig,
    pub push: PushConfig,
    pub diagnosis: DiagnosisConfig,
    pub remediation: RemediationConfig,
    pub banner: BannerConfig,
    pub logging: LoggingConfig,
}

impl BoardConfig {
    /// Load configuration: defaults, then the first config file found (or the
    /// explicit `path`), then environment overrides. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, BoardError> {
        let mut cfg = Self::default();
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(),
        };
        if let Some(file) = file {
            let raw = std::fs::read_to_string(&file).map_err(|err| BoardError::Config {
                message: format!("read {}: {err}", file.display()),
            })?;
            cfg.merge_yaml(&raw)?;
        }
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.expand_paths();
        cfg.validate()
            .map_err(|message| BoardError::Config { message })?;
        Ok(cfg)
    }

    /// Overlay values from a YAML document onto the current configuration.
    pub fn merge_yaml(&mut self, raw: &str) -> Result<(), BoardError> {
        let file: FileConfig = serde_yaml::from_str(raw).map_err(|err| BoardError::Config {
            message: format!("parse yaml: {err}"),
        })?;
        file.apply(self);
        Ok(())
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = v;
        }
        if let Some(v) = lookup(ENV_PUSH_URL).filter(|v| !v.trim().is_empty()) {
            self.push.url = v;
        }
        if let Some(v) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.logging.level = v;
        }
        if let Some(v) = lookup(ENV_LOG_FORMAT).filter(|v| !v.trim().is_empty()) {
            self.logging.format = v;
        }
    }

    /// Expands `~` in path-valued fields.
    pub fn expand_paths(&mut self) {
        self.logging.file = expand_tilde(&self.logging.file);
    }

    /// Validates the entire configuration, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        // API
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err("api.base_url must start with http:// or https://".into());
        }
        if self.api.request_timeout.is_zero() {
            return Err("api.request_timeout_ms must be greater than zero".into());
        }

        // Push
        if self.push.enabled
            && !(self.push.url.starts_with("ws://") || self.push.url.starts_with("wss://"))
        {
            return Err("push.url must start with ws:// or wss://".into());
        }

        // Diagnosis
        if self.diagnosis.auto_wait.is_zero() {
            return Err("diagnosis.auto_wait_ms must be greater than zero".into());
        }

        // Remediation
        if self.remediation.poll_interval < Duration::from_millis(100) {
            return Err("remediation.poll_interval_ms must be at least 100".into());
        }

        // Banner
        if self.banner.ttl.is_zero() {
            return Err("banner.ttl_ms must be greater than zero".into());
        }

        // Logging
        match self.logging.level.to_lowercase().trim() {
            "debug" | "info" | "warn" | "error" => {}
            _ => return Err("logging.level must be one of debug, info, warn, error".into()),
        }
        match self.logging.format.to_lowercase().trim() {
            "console" | "json" => {}
            _ => return Err("logging.format must be one of console, json".into()),
        }

        Ok(())
    }
}

/// REST boundary settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    pub url: String,
    pub enabled: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".into(),
            enabled: true,
        }
    }
}

/// Auto-wait and classification settings for AI analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisConfig {
    /// How long to wait for an automatic analysis before offering the manual trigger.
    pub auto_wait: Duration,
    /// Analysis text must be longer than this many characters to count as valid.
    pub min_valid_len: usize,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            auto_wait: Duration::from_secs(10),
            min_valid_len: 10,
        }
    }
}

/// Remediation polling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationConfig {
    pub poll_interval: Duration,
    /// Stop the poll loop on `cancelled` as well as `completed`/`failed`.
    pub stop_polling_on_cancelled: bool,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stop_polling_on_cancelled: true,
        }
    }
}

/// Transient banner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerConfig {
    pub ttl: Duration,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "console".into(),
            file: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// YAML file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api: Option<FileApi>,
    push: Option<FilePush>,
    diagnosis: Option<FileDiagnosis>,
    remediation: Option<FileRemediation>,
    banner: Option<FileBanner>,
    logging: Option<FileLogging>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileApi {
    base_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FilePush {
    url: Option<String>,
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileDiagnosis {
    auto_wait_ms: Option<u64>,
    min_valid_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileRemediation {
    poll_interval_ms: Option<u64>,
    stop_polling_on_cancelled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileBanner {
    ttl_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLogging {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl FileConfig {
    fn apply(self, cfg: &mut BoardConfig) {
        if let Some(api) = self.api {
            if let Some(v) = api.base_url {
                cfg.api.base_url = v;
            }
            if let Some(ms) = api.connect_timeout_ms {
                cfg.api.connect_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = api.request_timeout_ms {
                cfg.api.request_timeout = Duration::from_millis(ms);
            }
        }
        if let Some(push) = self.push {
            if let Some(v) = push.url {
                cfg.push.url = v;
            }
            if let Some(v) = push.enabled {
                cfg.push.enabled = v;
            }
        }
        if let Some(diag) = self.diagnosis {
            if let Some(ms) = diag.auto_wait_ms {
                cfg.diagnosis.auto_wait = Duration::from_millis(ms);
            }
            if let Some(v) = diag.min_valid_len {
                cfg.diagnosis.min_valid_len = v;
            }
        }
        if let Some(rem) = self.remediation {
            if let Some(ms) = rem.poll_interval_ms {
                cfg.remediation.poll_interval = Duration::from_millis(ms);
            }
            if let Some(v) = rem.stop_polling_on_cancelled {
                cfg.remediation.stop_polling_on_cancelled = v;
            }
        }
        if let Some(banner) = self.banner {
            if let Some(ms) = banner.ttl_ms {
                cfg.banner.ttl = Duration::from_millis(ms);
            }
        }
        if let Some(logging) = self.logging {
            if let Some(v) = logging.level {
                cfg.logging.level = v;
            }
            if let Some(v) = logging.format {
                cfg.logging.format = v;
            }
            if let Some(v) = logging.file {
                cfg.logging.file = v;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if path.is_empty() {
        return path.to_string();
    }
    if path == "~" {
        return home_dir().display().to_string();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir().join(rest).display().to_string();
    }
    path.to_string()
}

/// Search for a configuration file in the standard locations.
/// Returns `None` if no config file is found.
pub fn find_config_file() -> Option<PathBuf> {
    config_search_paths()
        .into_iter()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(Path::new(&xdg).join(CONFIG_DIR_NAME));
    }

    let home = home_dir();
    if home.as_os_str() != "" {
        paths.push(home.join(".config").join(CONFIG_DIR_NAME));
    }

    paths.push(PathBuf::from("."));
    paths
}

/// Get the user's home directory, falling back to `/` on failure.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = BoardConfig::default();
        assert_eq!(cfg.diagnosis.auto_wait, Duration::from_secs(10));
        assert_eq!(cfg.diagnosis.min_valid_len, 10);
        assert_eq!(cfg.remediation.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.banner.ttl, Duration::from_secs(3));
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.remediation.stop_polling_on_cancelled);
    }

    #[test]
    fn config_default_validates() {
        assert!(BoardConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut cfg = BoardConfig::default();
        cfg.logging.level = "trace-all".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("logging.level"), "{err}");
    }

    #[test]
    fn validate_rejects_non_ws_push_url_only_when_enabled() {
        let mut cfg = BoardConfig::default();
        cfg.push.url = "http://localhost/ws".into();
        assert!(cfg.validate().is_err());
        cfg.push.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_tiny_poll_interval() {
        let mut cfg = BoardConfig::default();
        cfg.remediation.poll_interval = Duration::from_millis(5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn yaml_overlays_only_present_fields() {
        let mut cfg = BoardConfig::default();
        cfg.merge_yaml(
            "api:\n  base_url: https://board.internal\nremediation:\n  poll_interval_ms: 500\n  stop_polling_on_cancelled: false\n",
        )
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://board.internal");
        assert_eq!(cfg.api.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.remediation.poll_interval, Duration::from_millis(500));
        assert!(!cfg.remediation.stop_polling_on_cancelled);
        assert_eq!(cfg.diagnosis.auto_wait, Duration::from_secs(10));
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let mut cfg = BoardConfig::default();
        let err = cfg.merge_yaml("api:\n  base_uri: http://x\n").unwrap_err();
        assert!(matches!(err, BoardError::Config { .. }));
    }

    #[test]
    fn env_overrides_win_and_ignore_blank_values() {
        let mut cfg = BoardConfig::default();
        cfg.apply_env_overrides(|key| match key {
            ENV_API_URL => Some("http://api:9000".into()),
            ENV_LOG_LEVEL => Some("  ".into()),
            _ => None,
        });
        assert_eq!(cfg.api.base_url, "http://api:9000");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "banner:\n  ttl_ms: 1500\n").unwrap();
        let cfg = BoardConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.banner.ttl, Duration::from_millis(1500));
    }

    #[test]
    fn expand_tilde_works() {
        let expanded = expand_tilde("~/logs/board.log");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("logs/board.log"));
        assert_eq!(expand_tilde("/abs/path"), "/abs/path");
        assert_eq!(expand_tilde(""), "");
    }
}
