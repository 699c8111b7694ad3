// src/logging.rs

//! Logging setup for `pipewrap` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `PIPEWRAP_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Where the output goes is decided by the logger mode (`--lmode`). Logs
//! never go to stdout: stdout belongs to the consumer.
//!
//! [`Logger`] also owns the per-role error sinks: in file modes every child
//! gets its stderr redirected to `<run id>-<role>.log`.

use std::collections::BTreeMap;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::Rng;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::cli::{LogLevel, LogMode};
use crate::errors::{PipewrapError, Result};
use crate::types::Role;

const RUN_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RUN_ID_SUFFIX_LEN: usize = 5;

/// Generate a run identifier like `2025-03-01_14-05-09-123_K3Z9Q`.
pub fn generate_run_id() -> String {
    let time_part = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S-%3f");
    let mut rng = rand::thread_rng();
    let random_part: String = (0..RUN_ID_SUFFIX_LEN)
        .map(|_| RUN_ID_ALPHABET[rng.gen_range(0..RUN_ID_ALPHABET.len())] as char)
        .collect();
    format!("{time_part}_{random_part}")
}

/// Per-run log resources.
#[derive(Debug)]
pub struct Logger {
    run_id: String,
    mode: LogMode,
    main_log: Option<File>,
    error_sinks: BTreeMap<Role, File>,
}

impl Logger {
    /// Open the log files required by `mode` inside `log_dir`.
    pub fn open(mode: LogMode, log_dir: &Path, run_id: impl Into<String>) -> Result<Self> {
        let run_id = run_id.into();
        let mut logger = Self::detached(run_id);
        logger.mode = mode;

        if mode.logs_to_file() {
            let main_path = log_file_path(log_dir, &logger.run_id, "pipewrap");
            let main_log = File::create(&main_path).map_err(|e| {
                PipewrapError::MainLoggerFailed(format!("{}: {e}", main_path.display()))
            })?;
            logger.main_log = Some(main_log);

            for role in Role::ALL {
                let path = log_file_path(log_dir, &logger.run_id, role.name());
                let sink = File::create(&path)
                    .map_err(|source| PipewrapError::ExecutableLoggerFailed { role, source })?;
                logger.error_sinks.insert(role, sink);
            }
        }

        Ok(logger)
    }

    /// A logger without files: children inherit the wrapper's stderr.
    pub fn detached(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            mode: LogMode::Sil,
            main_log: None,
            error_sinks: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn mode(&self) -> LogMode {
        self.mode
    }

    /// Writable destination for a child's stderr.
    ///
    /// `None` means "inherit the wrapper's stderr". The returned descriptor
    /// is a fresh duplicate owned by the caller.
    pub fn error_sink(&self, role: Role) -> Result<Option<OwnedFd>> {
        match self.error_sinks.get(&role) {
            Some(file) => {
                let dup = file
                    .try_clone()
                    .map_err(|source| PipewrapError::ExecutableLoggerFailed { role, source })?;
                Ok(Some(OwnedFd::from(dup)))
            }
            None => Ok(None),
        }
    }

    /// Release the per-role sinks. Never fails.
    pub fn close(self) {
        info!(run_id = %self.run_id, "closing the logger");
        drop(self.error_sinks);
    }
}

fn log_file_path(log_dir: &Path, run_id: &str, name: &str) -> PathBuf {
    log_dir.join(format!("{run_id}-{name}.log"))
}

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup. Takes ownership of the logger's main log
/// file, if any.
pub fn init_logging(logger: &mut Logger, cli_level: Option<LogLevel>) -> Result<()> {
    let mode = logger.mode;
    let level = if mode == LogMode::Sil {
        LevelFilter::OFF
    } else {
        match cli_level {
            Some(lvl) => LevelFilter::from_level(level_from_log_level(lvl)),
            None => std::env::var("PIPEWRAP_LOG")
                .ok()
                .and_then(|s| parse_level_str(&s))
                .map(LevelFilter::from_level)
                .unwrap_or(LevelFilter::INFO),
        }
    };

    let writer = match (mode.logs_to_console(), logger.main_log.take()) {
        (true, Some(file)) => BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file))),
        (false, Some(file)) => BoxMakeWriter::new(Mutex::new(file)),
        (true, None) => BoxMakeWriter::new(std::io::stderr),
        (false, None) => BoxMakeWriter::new(std::io::sink),
    };

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(!mode.logs_to_file())
        .with_writer(writer)
        .try_init()
        .map_err(|e| PipewrapError::MainLoggerFailed(e.to_string()))?;

    Ok(())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
