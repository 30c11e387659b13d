// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup shared by the experiment bridge binaries.
//!
//! Every binary initializes tracing through this crate so that filters,
//! output formats and log file locations behave the same way everywhere.
//! `RUST_LOG` always wins over the level passed on the command line.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::Level;

/// Directory and file stem used for the platform log location.
const APP_DIR: &str = "experiment-bridge";

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// One JSON object per line, for log shippers
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaintext" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: {}. Use 'plaintext' or 'json'",
                s
            )),
        }
    }
}

/// Log level accepted on the command line
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CliLogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Logging flags shared by all bridge binaries.
///
/// Flatten into a clap parser with `#[command(flatten)]`. Output goes to the
/// console unless `--log-file` or `--log-dir` is given.
#[derive(Clone, Debug, Default, clap::Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliLoggingArgs {
    /// Log verbosity level (default: info)
    #[arg(long, value_enum, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<CliLogLevel>,

    /// Log output format (default: plaintext)
    #[arg(long, value_enum, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// Directory for log files
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Log filename, relative to `--log-dir` unless absolute
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl CliLoggingArgs {
    /// Initialize the global subscriber for `component` at info level by default.
    pub fn init(self, component: &str) -> anyhow::Result<()> {
        self.init_with_default_level(component, CliLogLevel::Info)
    }

    pub fn init_with_default_level(
        self,
        component: &str,
        default_level: CliLogLevel,
    ) -> anyhow::Result<()> {
        let level = self.log_level.unwrap_or(default_level).into();
        let format = self.log_format.unwrap_or_default();

        if self.logs_to_file() {
            let log_path = self.resolve_log_path(component);
            init_to_file(component, level, format, &log_path)
        } else {
            init(component, level, format)
        }
    }

    /// Like [`CliLoggingArgs::init`], but console output goes to stderr.
    pub fn init_stderr(self, component: &str) -> anyhow::Result<()> {
        let level = self.log_level.unwrap_or_default().into();
        let format = self.log_format.unwrap_or_default();

        if self.logs_to_file() {
            let log_path = self.resolve_log_path(component);
            init_to_file(component, level, format, &log_path)
        } else {
            init_stderr(component, level, format)
        }
    }

    /// Whether the flags ask for file output instead of the console.
    pub fn logs_to_file(&self) -> bool {
        self.log_file.is_some() || self.log_dir.is_some()
    }

    /// Resolve where file output should go.
    ///
    /// An absolute `--log-file` is used as is. A relative one is placed under
    /// `--log-dir` when given. With only `--log-dir`, the file is named after
    /// the component. Otherwise the platform location is used.
    pub fn resolve_log_path(&self, component: &str) -> PathBuf {
        match (&self.log_file, &self.log_dir) {
            (Some(file), _) if Path::new(file).is_absolute() => PathBuf::from(file),
            (Some(file), Some(dir)) => Path::new(dir).join(file),
            (Some(file), None) if has_directory(file) => PathBuf::from(file),
            (Some(file), None) => standard_log_dir().join(file),
            (None, Some(dir)) => Path::new(dir).join(format!("{}.log", component)),
            (None, None) => standard_log_path_for_component(component),
        }
    }
}

fn has_directory(file: &str) -> bool {
    Path::new(file).parent().is_some_and(|parent| !parent.as_os_str().is_empty())
}

/// Platform directory holding bridge log files.
///
/// - macOS: `~/Library/Logs/experiment-bridge`
/// - Windows: `%APPDATA%\experiment-bridge`
/// - elsewhere: `$XDG_DATA_HOME/experiment-bridge` (usually `~/.local/share`)
pub fn standard_log_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push("Library");
        path.push("Logs");
        path.push(APP_DIR);
        path
    }

    #[cfg(not(target_os = "macos"))]
    {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push(APP_DIR);
        path
    }
}

/// Log file for a component inside [`standard_log_dir`].
pub fn standard_log_path_for_component(component: &str) -> PathBuf {
    standard_log_dir().join(format!("{}.log", component))
}

/// Initialize console logging (stdout).
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stdout)
}

/// Initialize console logging on stderr, for commands whose stdout is data.
pub fn init_stderr(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stderr)
}

/// Initialize logging into `log_path`, creating parent directories as needed.
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    let log_file = open_log_file(log_path)?;
    init_with_writer(component, default_level, format, log_file)
}

fn open_log_file(log_path: &Path) -> io::Result<std::fs::File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(log_path)
}

/// Filter used when `RUST_LOG` is not set.
fn default_filter(component: &str, default_level: Level) -> EnvFilter {
    let target = component.replace('-', "_");
    EnvFilter::new(format!("{},{}={}", default_level, target, default_level))
}

/// Initialize logging with a custom writer
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(component, default_level));

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

/// Placeholder printed instead of a secret.
///
/// ```rust
/// use eb_logging::redact;
///
/// let rest_key = "s3cr3t";
/// tracing::info!(rest_key = %redact(rest_key), "REST key configured");
/// ```
pub fn redact(_value: impl std::fmt::Display) -> &'static str {
    "[REDACTED]"
}

/// Process-unique identifier for a client connection, used as a log field.
pub fn connection_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("conn-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
