use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error};

use crate::journal::parse_log_timestamp;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RotationReport {
    pub retained: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Bounds the number of run logs kept in one directory.
#[derive(Debug, Clone)]
pub struct LogRotator {
    dir: PathBuf,
    prefix: String,
}

impl LogRotator {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Deletes the oldest run logs so that, once the log for the current run
    /// is written, at most `keep_count` remain.
    pub fn rotate(&self, keep_count: usize) -> RotationReport {
        let mut report = RotationReport::default();
        let retain = keep_count.saturating_sub(1);

        let mut logs = match self.existing_logs() {
            Ok(logs) => logs,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return report,
            Err(err) => {
                error!(dir = %self.dir.display(), error = %err, "Cannot list run logs");
                return report;
            }
        };

        if logs.len() <= retain {
            report.retained = logs;
            return report;
        }

        let stale = logs.len() - retain;
        report.retained = logs.split_off(stale);
        for path in logs {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(log = %path.display(), "Deleted old run log");
                    report.deleted.push(path);
                }
                Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    error!(log = %path.display(), "Cannot delete log file without permission");
                    report.failed.push(path);
                }
                Err(err) => {
                    error!(log = %path.display(), error = %err, "Cannot delete log file");
                    report.failed.push(path);
                }
            }
        }
        report
    }

    /// Run logs sorted oldest first.
    pub fn existing_logs(&self) -> io::Result<Vec<PathBuf>> {
        let mut logs: Vec<(i64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(timestamp) = parse_log_timestamp(&name.to_string_lossy(), &self.prefix) {
                logs.push((timestamp, entry.path()));
            }
        }
        logs.sort();
        Ok(logs.into_iter().map(|(_, path)| path).collect())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
