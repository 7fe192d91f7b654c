//! Configuration and settings management
//!
//! Loads settings from environment variables and defines fixed tunables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// The single inbound document extension the bot accepts (lowercase).
pub const SUPPORTED_EXTENSION: &str = "docx";
/// Target format passed to the external converter.
pub const TARGET_FORMAT: &str = "pdf";

/// Maximum file size for document uploads (20 MB)
pub const MAX_DOCUMENT_SIZE: u32 = 20 * 1024 * 1024;

/// Maximum outbound delivery attempts for transient failures
pub const MAX_SEND_RETRIES: usize = 3;
/// Fixed delay between outbound delivery attempts
pub const SEND_RETRY_DELAY: Duration = Duration::from_secs(1);

// Telegram file download retry policy (exponential backoff with jitter)
/// Initial backoff for Telegram file downloads
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Backoff ceiling for Telegram file downloads
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Download retry attempts
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Hard ceiling on a single converter invocation
pub const CONVERT_TIMEOUT: Duration = Duration::from_secs(120);
/// Concurrent converter child processes
pub const CONVERT_WORKERS: usize = 2;

/// Sessions idle longer than this are reaped
pub const SESSION_TTL: Duration = Duration::from_secs(3600);
/// Stale-session reaper wakeup interval
pub const REAPER_INTERVAL: Duration = Duration::from_secs(300);

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Directory holding transient document artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// LibreOffice binary used for PDF conversion
    #[serde(default = "default_soffice_bin")]
    pub soffice_bin: String,
}

fn default_work_dir() -> String {
    "footer-work".to_string()
}

fn default_soffice_bin() -> String {
    "soffice".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or `TELEGRAM_TOKEN`
    /// is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to
            // snake_case; ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }
}
