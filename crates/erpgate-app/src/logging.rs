//! Logging and tracing setup for the gateway process
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! An optional JSON layer writes to a daily rotated file for production.
//! `RUST_LOG` takes precedence over the configured filter.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::settings::{LogProfile, LoggingSettings};

const LOG_FILE_PREFIX: &str = "erpgate.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for the JSON log files
    pub log_dir: PathBuf,

    /// Whether to write JSON logs to files
    pub enable_json_logs: bool,

    pub enable_console_logs: bool,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close (for timing pool and connector calls)
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            enable_spans: cfg!(debug_assertions),
            default_filter: "info,erpgate=debug,erpgate_core=debug,erpgate_connectors=debug,erpgate_pool=debug".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Production configuration (compact console output, JSON logs on disk)
    pub fn production() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: true,
            enable_console_logs: true,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,erpgate=info,erpgate_connectors=info,erpgate_pool=info".to_string(),
        }
    }

    /// Development configuration (pretty console output, verbose logging)
    pub fn development() -> Self {
        Self::default()
    }

    /// Testing configuration (console only, no files)
    pub fn testing() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("erpgate-tests"),
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: true,
            enable_spans: true,
            default_filter: "debug".to_string(),
        }
    }

    pub fn for_profile(profile: LogProfile) -> Self {
        match profile {
            LogProfile::Development => Self::development(),
            LogProfile::Production => Self::production(),
            LogProfile::Testing => Self::testing(),
        }
    }

    /// Start from the profile preset, then apply the explicit settings
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let profile = settings.profile.unwrap_or(if cfg!(debug_assertions) {
            LogProfile::Development
        } else {
            LogProfile::Production
        });

        let mut config = Self::for_profile(profile);
        if let Some(filter) = &settings.filter {
            config.default_filter = filter.clone();
        }
        if let Some(dir) = &settings.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(json) = settings.json {
            config.enable_json_logs = json;
        }
        config
    }
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer; keep it alive for the
/// lifetime of the process.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))?;

    // NEW fires once per span; ENTER would fire on every re-poll of an
    // awaited future
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();
    let mut guard = None;

    if config.enable_console_logs {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone())
            .with_ansi(true)
            .pretty()
            .with_filter(env_filter.clone())
            .boxed();

        layers.push(console_layer);
    }

    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();

        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::info!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        console_enabled = config.enable_console_logs,
        "Logging system initialized"
    );

    Ok(guard)
}

/// Default directory for the JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("erpgate")
        .join("logs")
}
