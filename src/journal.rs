use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const LOG_PREFIX: &str = "scriptsmith";
pub const LOG_EXTENSION: &str = "log";

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("record '{0}' was already written to this run log")]
    DuplicateKey(String),
    #[error("failed to serialize record '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append record '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Serialize)]
struct LogLine<'a> {
    key: &'a str,
    recorded_at: DateTime<Utc>,
    value: Value,
}

/// Append-only JSON-lines log for a single run.
///
/// Every record is flushed as soon as it is written, so a crash loses at
/// most the record being written.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
    keys: HashSet<String>,
}

impl RunLog {
    /// Creates `<dir>/<prefix>-<unix seconds>.log`, creating `dir` if needed.
    ///
    /// Every run gets a file of its own: when a log for the current second
    /// already exists, the next free later timestamp is used instead.
    pub fn create(dir: &Path, prefix: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let mut timestamp = Utc::now().timestamp();
        loop {
            let path = dir.join(log_file_name(prefix, timestamp));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        file,
                        keys: HashSet::new(),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => timestamp += 1,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to open run log: {}", path.display()));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), RunLogError> {
        if self.keys.contains(key) {
            return Err(RunLogError::DuplicateKey(key.to_string()));
        }
        let value = serde_json::to_value(value).map_err(|source| RunLogError::Serialize {
            key: key.to_string(),
            source,
        })?;
        let line = LogLine {
            key,
            recorded_at: Utc::now(),
            value,
        };
        let mut encoded = serde_json::to_vec(&line).map_err(|source| RunLogError::Serialize {
            key: key.to_string(),
            source,
        })?;
        encoded.push(b'\n');
        self.file
            .write_all(&encoded)
            .and_then(|_| self.file.flush())
            .map_err(|source| RunLogError::Io {
                key: key.to_string(),
                source,
            })?;
        self.keys.insert(key.to_string());
        Ok(())
    }
}

pub fn log_file_name(prefix: &str, timestamp: i64) -> String {
    format!("{prefix}-{timestamp}.{LOG_EXTENSION}")
}

/// Parses the timestamp out of a `<prefix>-<unix seconds>.log` file name.
pub fn parse_log_timestamp(file_name: &str, prefix: &str) -> Option<i64> {
    file_name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(LOG_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Reads back every record of a run log, in write order.
pub fn read_records(path: &Path) -> Result<Vec<(String, Value)>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read run log: {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parsed: Value = serde_json::from_str(line)
                .with_context(|| format!("Malformed run log line in {}", path.display()))?;
            let key = parsed
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let value = parsed
                .get_mut("value")
                .map(Value::take)
                .unwrap_or(Value::Null);
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn records_are_appended_in_order() {
        let temp = tempdir().unwrap();
        let mut log = RunLog::create(&temp.path().join("logs"), LOG_PREFIX).unwrap();
        log.record("first", &json!({"a": 1})).unwrap();
        log.record("second", &vec!["x", "y"]).unwrap();

        let records = read_records(log.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "first");
        assert_eq!(records[0].1, json!({"a": 1}));
        assert_eq!(records[1].1, json!(["x", "y"]));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let temp = tempdir().unwrap();
        let mut log = RunLog::create(temp.path(), LOG_PREFIX).unwrap();
        log.record("project_data", &1).unwrap();
        let err = log.record("project_data", &2).unwrap_err();
        assert!(matches!(err, RunLogError::DuplicateKey(key) if key == "project_data"));
        assert_eq!(read_records(log.path()).unwrap().len(), 1);
    }

    #[test]
    fn runs_in_the_same_second_get_separate_logs() {
        let temp = tempdir().unwrap();
        let mut first = RunLog::create(temp.path(), LOG_PREFIX).unwrap();
        let mut second = RunLog::create(temp.path(), LOG_PREFIX).unwrap();
        assert_ne!(first.path(), second.path());

        let stamp = |log: &RunLog| {
            let name = log.path().file_name().unwrap().to_string_lossy().into_owned();
            parse_log_timestamp(&name, LOG_PREFIX).unwrap()
        };
        assert!(stamp(&second) > stamp(&first));

        first.record("options", &1).unwrap();
        second.record("options", &2).unwrap();
        assert_eq!(read_records(first.path()).unwrap().len(), 1);
        assert_eq!(read_records(second.path()).unwrap().len(), 1);
    }

    #[test]
    fn file_names_round_trip_timestamps() {
        let name = log_file_name(LOG_PREFIX, 1_700_000_123);
        assert_eq!(name, "scriptsmith-1700000123.log");
        assert_eq!(parse_log_timestamp(&name, LOG_PREFIX), Some(1_700_000_123));
        assert_eq!(parse_log_timestamp("other-1.log", LOG_PREFIX), None);
        assert_eq!(parse_log_timestamp("scriptsmith-abc.log", LOG_PREFIX), None);
    }
}
