//! Per-run log file.
//!
//! Each stage appends to its own file; every line carries a
//! `[YYYY-MM-DD HH:MM:SS]` prefix. Lines are echoed to stdout for interactive
//! runs and mirrored to `tracing` at the event's level.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::app::{EventLevel, ProgressEvent, ProgressSink};
use crate::error::PipelineError;

pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
    echo: bool,
}

impl RunLog {
    /// Opens `path` for appending, creating parent directories as needed.
    pub fn open(path: &Path, echo: bool) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                PipelineError::Filesystem(format!("create log dir {}: {err}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| {
                PipelineError::Filesystem(format!("open log {}: {err}", path.display()))
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            echo,
        })
    }
}

impl ProgressSink for RunLog {
    fn event(&self, event: ProgressEvent) {
        match event.level {
            EventLevel::Info => tracing::info!("{}", event.message),
            EventLevel::Warn => tracing::warn!("{}", event.message),
            EventLevel::Error => tracing::error!("{}", event.message),
        }

        let line = format_line(Local::now(), &event.message);
        if let Ok(mut file) = self.file.lock() {
            if let Err(err) = writeln!(file, "{line}") {
                tracing::error!("failed to write {}: {err}", self.path.display());
            }
        }
        if self.echo {
            let mut stdout = io::stdout();
            let _ = writeln!(stdout, "{line}");
        }
    }
}

pub fn format_line(now: DateTime<Local>, message: &str) -> String {
    format!("{} {message}", now.format("[%Y-%m-%d %H:%M:%S]"))
}
