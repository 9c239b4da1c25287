use log::LevelFilter;
use simplelog::*;
use std::fs::File;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Logging configuration for the Plaza client
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Master switch to enable/disable all logging
    pub enabled: bool,
    /// Path to the log file
    pub log_file: PathBuf,
    /// Whether to clear the log file on startup
    pub clear_on_startup: bool,
    /// Feature flags for specific logging categories
    pub features: LogFeatures,
    /// Overall log level
    pub level: LevelFilter,
}

/// Feature flags for specific logging categories
#[derive(Debug, Clone, Copy)]
pub struct LogFeatures {
    /// Outbound requests and their outcome
    pub api_calls: bool,
    /// Comment thread state transitions
    pub thread: bool,
    /// Session establish/clear
    pub session: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: PathBuf::from("plaza.log"),
            clear_on_startup: false,
            features: LogFeatures::default(),
            level: LevelFilter::Info,
        }
    }
}

impl Default for LogFeatures {
    fn default() -> Self {
        Self {
            api_calls: true,
            thread: true,
            session: true,
        }
    }
}

impl LogFeatures {
    pub fn none() -> Self {
        Self {
            api_calls: false,
            thread: false,
            session: false,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with all features disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            features: LogFeatures::none(),
            ..Default::default()
        }
    }

    /// Create a minimal log configuration (only errors and warnings)
    pub fn minimal() -> Self {
        Self {
            enabled: true,
            level: LevelFilter::Warn,
            features: LogFeatures::none(),
            ..Default::default()
        }
    }

    /// Create a verbose log configuration (all features enabled)
    pub fn verbose() -> Self {
        Self {
            enabled: true,
            level: LevelFilter::Trace,
            features: LogFeatures::default(),
            ..Default::default()
        }
    }
}

static ACTIVE_FEATURES: OnceLock<LogFeatures> = OnceLock::new();

/// Features of the installed configuration. Before `init_logging` runs every
/// feature is on, so messages still reach whatever logger the host installed.
pub fn active_features() -> LogFeatures {
    ACTIVE_FEATURES.get().copied().unwrap_or_default()
}

/// Initialize the logging system with the given configuration
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let _ = ACTIVE_FEATURES.set(config.features);

    if !config.enabled {
        let _ = WriteLogger::init(LevelFilter::Off, Config::default(), std::io::sink());
        return Ok(());
    }

    if config.clear_on_startup {
        let _ = File::create(&config.log_file)?;
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_time_offset_to_local()
        .unwrap_or_else(|builder| builder)
        .build();

    WriteLogger::init(config.level, log_config, log_file)?;

    log::info!(
        "Logging initialized: file={}, level={:?}",
        config.log_file.display(),
        config.level
    );
    log::debug!("Log features: {:?}", config.features);

    Ok(())
}

/// Macro for logging API calls
#[macro_export]
macro_rules! log_api_call {
    ($($arg:tt)*) => {
        if $crate::logging::active_features().api_calls {
            log::debug!(target: "api_calls", $($arg)*);
        }
    };
}

/// Macro for logging comment thread transitions
#[macro_export]
macro_rules! log_thread {
    ($($arg:tt)*) => {
        if $crate::logging::active_features().thread {
            log::debug!(target: "thread", $($arg)*);
        }
    };
}

/// Macro for logging session lifecycle events
#[macro_export]
macro_rules! log_session {
    ($($arg:tt)*) => {
        if $crate::logging::active_features().session {
            log::info!(target: "session", $($arg)*);
        }
    };
}
