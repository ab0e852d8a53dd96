//! Local JSON-lines fallback sink.
//!
//! # Responsibilities
//! - Append every accepted envelope to `<log_path>/<file_name>` as one JSON line
//! - Keep working when the broker is unreachable
//!
//! # Design Decisions
//! - The directory is created on first write, not at construction
//! - Write failures return `false` with a warning, never an error
//! - The file handle is opened once and kept; a failed write drops it so the
//!   next write reopens

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::schema::LoggingConfig;
use crate::delivery::message::{LogEnvelope, LogLevel};
use crate::observability::metrics;

/// Append-only JSON-lines writer.
#[derive(Debug)]
pub struct FallbackSink {
    path: PathBuf,
    enabled: bool,
    levels: Vec<LogLevel>,
    file: Mutex<Option<File>>,
}

impl FallbackSink {
    /// Sink writing every level to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            levels: LogLevel::ALL.to_vec(),
            file: Mutex::new(None),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            path: Path::new(&config.log_path).join(&config.file_name),
            enabled: config.local_logging,
            levels: config.file_levels.clone(),
            file: Mutex::new(None),
        }
    }

    /// A sink that accepts nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(PathBuf::new())
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn accepts(&self, level: LogLevel) -> bool {
        self.enabled && self.levels.contains(&level)
    }

    /// Append one envelope. Returns `false` if it was filtered out or the write failed.
    pub fn write(&self, envelope: &LogEnvelope) -> bool {
        if !self.accepts(envelope.level) {
            return false;
        }

        let ok = match self.append(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Fallback write failed");
                false
            }
        };
        metrics::record_fallback_write(ok);
        ok
    }

    fn append(&self, envelope: &LogEnvelope) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(envelope)?;
        line.push(b'\n');

        let mut guard = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let result = match guard.as_mut() {
            Some(file) => file.write_all(&line).and_then(|()| file.flush()),
            None => Ok(()),
        };
        if result.is_err() {
            *guard = None;
        }
        result
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}
