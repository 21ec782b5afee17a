//! Tracing subscriber setup
//!
//! `--log-level` sets the default directive and `RUST_LOG` can refine it
//! per target. `--log-file` appends plain text to a file; when the file
//! cannot be opened, output stays on stdout and an error is logged.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Logging options from the command line
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// Parse `trace|debug|info|warn|error` (case-insensitive)
pub fn parse_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).with_context(|| format!("Can't parse log level {level:?}"))
}

/// Filter with `level` as default, refined by `RUST_LOG`
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}

/// Open `path` for appending, creating it if needed
pub fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let level = parse_level(&config.level)?;

    let mut file_error = None;
    let (writer, ansi) = match config.file.as_deref().map(|p| (p, open_log_file(p))) {
        Some((_, Ok(file))) => (BoxMakeWriter::new(Mutex::new(file)), false),
        Some((path, Err(e))) => {
            file_error = Some((path.to_path_buf(), e));
            (BoxMakeWriter::new(io::stdout), true)
        }
        None => (BoxMakeWriter::new(io::stdout), true),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(writer)
        .with_ansi(ansi)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install tracing subscriber")?;

    if let Some((path, e)) = file_error {
        tracing::error!(path = %path.display(), error = %e, "Unable to log to file, using stdout");
    }
    tracing::debug!(%level, "Log level set");
    Ok(())
}
