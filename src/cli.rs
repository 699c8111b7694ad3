// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::DEFAULT_TIMEOUT_SECS;

/// Command-line arguments for `pipewrap`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipewrap",
    version,
    about = "Run a producer | consumer pipeline with timeout and termination control.",
    long_about = None
)]
pub struct CliArgs {
    /// Profile name (directory with producer.json / consumer.json).
    ///
    /// Use `NUL` to run a direct pipe of the first two placeholder arguments.
    #[arg(long, value_name = "NAME")]
    pub profile: String,

    /// Logger mode. Default: `sil` (no logging).
    #[arg(long, value_enum, value_name = "MODE", ignore_case = true)]
    pub lmode: Option<LogMode>,

    /// Seconds before children are force-terminated; `0` disables the timeout.
    #[arg(
        long = "t",
        visible_alias = "timeout",
        value_name = "SECONDS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub timeout: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEWRAP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Directory holding the profile directories.
    ///
    /// Default: `PIPEWRAP_CONFIG_DIR`, else the directory of this executable.
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Directory for log files in `file` / `incl` modes.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub log_dir: PathBuf,

    /// Abort early when no data arrives on the pipe during the liveness probe.
    #[arg(long)]
    pub strict_pipe_probe: bool,

    /// Resolve and print the command lines, but don't spawn anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Values for `%1`..`%N` placeholders in executable configs.
    #[arg(value_name = "PLACEHOLDERS")]
    pub placeholders: Vec<String>,
}

/// Where log output goes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum LogMode {
    /// Console and files.
    Incl,
    /// Files only.
    File,
    /// Console (stderr) only.
    Con,
    /// No logging.
    #[default]
    Sil,
}

impl LogMode {
    pub fn logs_to_file(self) -> bool {
        matches!(self, LogMode::Incl | LogMode::File)
    }

    pub fn logs_to_console(self) -> bool {
        matches!(self, LogMode::Incl | LogMode::Con)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse arguments, returning clap's error instead of exiting.
pub fn try_parse_from<I, T>(args: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    CliArgs::try_parse_from(args)
}
