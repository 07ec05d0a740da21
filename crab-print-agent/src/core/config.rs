//! Location config store and runtime settings

use crate::core::error::ConfigError;
use crate::utils::fs::write_atomic;
use crab_printer::Charset;
use shared::LocationConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location identity file inside the work dir
pub const LOCATION_FILE: &str = "location.json";

/// Persisted location identity
///
/// `load()` is the only entry point used by the running agent. `save()` is
/// reserved for the `setup` command.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            path: work_dir.as_ref().join(LOCATION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and validate the location config
    pub fn load(&self) -> Result<LocationConfig, ConfigError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(self.path.clone()));
            }
            Err(source) => {
                return Err(ConfigError::Unreadable {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let config: LocationConfig =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        validate(&config)?;
        Ok(config)
    }

    /// Validate and atomically write the location config
    pub fn save(&self, config: &LocationConfig) -> Result<(), ConfigError> {
        validate(config)?;

        let json = serde_json::to_vec_pretty(config).map_err(|source| ConfigError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Schema checks for a location config
pub fn validate(config: &LocationConfig) -> Result<(), ConfigError> {
    if config.location_id.trim().is_empty() {
        return Err(ConfigError::Invalid("locationId is required".into()));
    }
    let url = config.server_url.trim();
    if url.is_empty() {
        return Err(ConfigError::Invalid("serverUrl is required".into()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!(
            "serverUrl must start with http:// or https://, got {}",
            url
        )));
    }
    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "pollIntervalMs must be greater than 0".into(),
        ));
    }
    if config.printer_name.trim().is_empty() {
        return Err(ConfigError::Invalid("printerName is required".into()));
    }
    Ok(())
}

/// Agent runtime settings
///
/// # Environment variables
///
/// Values are read from `<WORK_DIR>/.env` first, then the process environment.
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | $HOME/.crab-print-agent | agent state directory |
/// | LOG_LEVEL | info | tracing level |
/// | REQUEST_TIMEOUT_MS | 10000 | central server call timeout |
/// | POLL_BACKOFF_MAX_MS | 60000 | watcher backoff cap |
/// | PRINT_MAX_RETRIES | 5 | printer attempts before dead-lettering |
/// | PRINT_RETRY_BASE_MS | 2000 | first print retry delay |
/// | PRINT_RETRY_MAX_MS | 60000 | print retry delay cap |
/// | RESTART_DELAY_MS | 5000 | supervisor restart delay |
/// | MAX_RESTARTS | 5 | restarts allowed within the window |
/// | RESTART_WINDOW_SECS | 300 | restart window |
/// | PRINTED_RETENTION_DAYS | 14 | printed mark retention |
/// | PRINTER_CHARSET | wpc1254 | printer code page |
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Work directory: location config, cursor, queue database, logs
    pub work_dir: PathBuf,
    pub log_level: String,
    pub request_timeout_ms: u64,
    pub poll_backoff_max_ms: u64,
    pub print_max_retries: u32,
    pub print_retry_base_ms: u64,
    pub print_retry_max_ms: u64,
    pub restart_delay_ms: u64,
    pub max_restarts: u32,
    pub restart_window_secs: u64,
    pub printed_retention_days: u64,
    pub printer_charset: Charset,
}

impl AgentSettings {
    /// Load settings for a work dir, applying `<work_dir>/.env` first
    pub fn load(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let _ = dotenv::from_path(work_dir.join(".env"));
        Self::from_env(work_dir)
    }

    /// Read settings from the environment
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 10_000),
            poll_backoff_max_ms: env_parse("POLL_BACKOFF_MAX_MS", 60_000),
            print_max_retries: env_parse("PRINT_MAX_RETRIES", 5).max(1),
            print_retry_base_ms: env_parse("PRINT_RETRY_BASE_MS", 2_000),
            print_retry_max_ms: env_parse("PRINT_RETRY_MAX_MS", 60_000),
            restart_delay_ms: env_parse("RESTART_DELAY_MS", 5_000),
            max_restarts: env_parse("MAX_RESTARTS", 5),
            restart_window_secs: env_parse("RESTART_WINDOW_SECS", 300),
            printed_retention_days: env_parse("PRINTED_RETENTION_DAYS", 14),
            printer_charset: std::env::var("PRINTER_CHARSET")
                .ok()
                .and_then(|c| c.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Default work dir: `$HOME/.crab-print-agent`
    pub fn default_work_dir() -> PathBuf {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".crab-print-agent")
    }

    pub fn location_file(&self) -> PathBuf {
        self.work_dir.join(LOCATION_FILE)
    }

    pub fn cursor_file(&self) -> PathBuf {
        self.work_dir.join("cursor.json")
    }

    pub fn queue_db(&self) -> PathBuf {
        self.work_dir.join("agent.redb")
    }

    pub fn dead_letter_file(&self) -> PathBuf {
        self.work_dir.join("dead_letters.jsonl")
    }

    pub fn reprint_dir(&self) -> PathBuf {
        self.work_dir.join("reprint")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn print_retry_base(&self) -> Duration {
        Duration::from_millis(self.print_retry_base_ms)
    }

    pub fn print_retry_max(&self) -> Duration {
        Duration::from_millis(self.print_retry_max_ms)
    }

    pub fn poll_backoff_max(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_max_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    pub fn printed_retention(&self) -> Duration {
        Duration::from_secs(self.printed_retention_days * 24 * 60 * 60)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
