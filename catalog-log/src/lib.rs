//! Logging for the catalog crates.
//!
//! Leveled macros whose output is controlled entirely by environment
//! variables, so a library call site never has to carry a logger handle.
//!
//! # Usage
//!
//! ```rust
//! use catalog_log::{debug, info, warn};
//!
//! info!("Creating index {}", "item");
//! debug!(target: "catalog::engine", "search body: {}", "{}");
//! warn!("retrying after timeout");
//! ```
//!
//! # Environment Variables
//!
//! - `CATALOG_DEBUG=1` - shorthand for `CATALOG_LOG_LEVEL=debug`
//! - `CATALOG_LOG_LEVEL=trace|debug|info|warn|error|off`
//! - `CATALOG_LOG_FORMAT=pretty|compact|json` (default `json`)
//! - `CATALOG_LOG_TIMESTAMPS=1|0` (default `1`)
//! - `CATALOG_LOG_TARGET=1|0` - include the module path (default `1`)

use once_cell::sync::Lazy;
use std::env;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// Levels and formats
// ============================================================================

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Most verbose.
    Trace = 0,
    /// Engine request/response detail.
    Debug = 1,
    /// Administrative operations.
    Info = 2,
    /// Recoverable problems such as retries.
    Warn = 3,
    /// Failures surfaced to the caller.
    Error = 4,
    /// Nothing is logged.
    Off = 5,
}

impl Level {
    /// Upper-case level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }
}

impl FromStr for Level {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            _ => Err(ParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `2026-01-01 10:00:00.000 INFO  [target] message`
    Pretty,
    /// `10:00:00 I target: message`
    Compact,
    /// One JSON object per line.
    Json,
}

impl FromStr for Format {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            _ => Err(ParseError(s.to_string())),
        }
    }
}

/// Unrecognized level or format name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized log setting: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

// ============================================================================
// Configuration
// ============================================================================

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(|| {
    let config = LogConfig::from_env();
    LOG_LEVEL.store(config.level as u8, Ordering::SeqCst);
    config
});

/// Logging configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level written.
    pub level: Level,
    /// Output format.
    pub format: Format,
    /// Prefix records with a timestamp.
    pub timestamps: bool,
    /// Include the record's target (module path).
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Json,
            timestamps: true,
            target: true,
        }
    }
}

impl LogConfig {
    /// Build a configuration from `CATALOG_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let debug = env_flag("CATALOG_DEBUG").unwrap_or(false);

        let level = env::var("CATALOG_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { defaults.level });

        let format = env::var("CATALOG_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.format);

        Self {
            level,
            format,
            timestamps: env_flag("CATALOG_LOG_TIMESTAMPS").unwrap_or(defaults.timestamps),
            target: env_flag("CATALOG_LOG_TARGET").unwrap_or(defaults.target),
        }
    }

    /// Render one record as a single line, without the trailing newline.
    pub fn render(&self, level: Level, target: &str, message: &str) -> String {
        match self.format {
            Format::Pretty => self.render_pretty(level, target, message),
            Format::Compact => self.render_compact(level, target, message),
            Format::Json => self.render_json(level, target, message),
        }
    }

    fn render_pretty(&self, level: Level, target: &str, message: &str) -> String {
        let mut line = String::new();
        if self.timestamps {
            line.push_str(&chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f ").to_string());
        }
        line.push_str(&format!("{:5} ", level.as_str()));
        if self.target && !target.is_empty() {
            line.push_str(&format!("[{}] ", target));
        }
        line.push_str(message);
        line
    }

    fn render_compact(&self, level: Level, target: &str, message: &str) -> String {
        let mut line = String::new();
        if self.timestamps {
            line.push_str(&chrono::Local::now().format("%H:%M:%S ").to_string());
        }
        line.push(level.as_str().chars().next().unwrap_or('?'));
        line.push(' ');
        if self.target && !target.is_empty() {
            line.push_str(target);
            line.push_str(": ");
        }
        line.push_str(message);
        line
    }

    #[cfg(feature = "json")]
    fn render_json(&self, level: Level, target: &str, message: &str) -> String {
        use serde::Serialize;

        #[derive(Serialize)]
        struct Record<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            timestamp: Option<String>,
            level: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            target: Option<&'a str>,
            message: &'a str,
        }

        let record = Record {
            timestamp: self.timestamps.then(|| chrono::Utc::now().to_rfc3339()),
            level: level.as_str(),
            target: (self.target && !target.is_empty()).then_some(target),
            message,
        };

        serde_json::to_string(&record).unwrap_or_else(|_| self.render_compact(level, target, message))
    }

    // Without serde the compact layout stands in for JSON.
    #[cfg(not(feature = "json"))]
    fn render_json(&self, level: Level, target: &str, message: &str) -> String {
        self.render_compact(level, target, message)
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Public API
// ============================================================================

/// Force the environment to be read now instead of on the first record.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// The active configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Whether records at `level` are currently written.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    init();
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Current minimum level.
pub fn current_level() -> Level {
    init();
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Change the minimum level at runtime.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Write a record to stderr. Used by the macros.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    if !is_level_enabled(level) {
        return;
    }
    let line = config().render(level, target, message);
    let _ = writeln!(std::io::stderr().lock(), "{}", line);
}

// ============================================================================
// Macros
// ============================================================================

/// Log at an explicit level. The level macros below all expand to this.
///
/// The message is only formatted when `level` is enabled.
#[macro_export]
macro_rules! log_at {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {{
        let level = $level;
        if $crate::is_level_enabled(level) {
            $crate::log(level, $target, &format!($($arg)+));
        }
    }};
    ($level:expr, $($arg:tt)+) => {
        $crate::log_at!($level, target: module_path!(), $($arg)+)
    };
}

/// Log at trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => { $crate::log_at!($crate::Level::Trace, $($arg)+) };
}

/// Log at debug level.
///
/// ```rust
/// use catalog_log::debug;
///
/// let index = "item";
/// debug!("Searching index {}", index);
/// ```
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::log_at!($crate::Level::Debug, $($arg)+) };
}

/// Log at info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => { $crate::log_at!($crate::Level::Info, $($arg)+) };
}

/// Log at warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => { $crate::log_at!($crate::Level::Warn, $($arg)+) };
}

/// Log at error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => { $crate::log_at!($crate::Level::Error, $($arg)+) };
}
