use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_json::Value;

use crate::record::{LogKind, Record};
use crate::{StoreError, StoreResult};

/// Handle on the data directory backing the two logs.
///
/// Holds no open files; every append opens, locks, writes, and releases in
/// one call, so the handle is freely shareable across request handlers.
#[derive(Debug, Clone)]
pub struct LogStore {
    data_dir: PathBuf,
}

impl LogStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_path(&self, kind: LogKind) -> PathBuf {
        self.data_dir.join(kind.file_name())
    }

    /// Append one record to its log as a single JSONL line.
    ///
    /// The data directory and log file are created lazily. An exclusive
    /// advisory lock is held across write+flush so concurrent writers never
    /// interleave mid-line; the lock is released when the handle drops, on
    /// every exit path. Readers take no lock.
    pub fn append(&self, record: &Record) -> StoreResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|err| {
            StoreError::unavailable("Unable to create data directory", err)
        })?;

        // Serialize before touching the file so an encoding failure leaves
        // the log unmodified. serde_json writes non-ASCII characters
        // literally, which keeps the logs human-readable UTF-8.
        let line = serde_json::to_string(&record.body).map_err(StoreError::Encoding)?;

        let path = self.log_path(record.kind);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| StoreError::unavailable(record.kind.write_error(), err))?;

        file.lock_exclusive()
            .map_err(|err| StoreError::unavailable(record.kind.write_error(), err))?;

        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush())
            .map_err(|err| StoreError::unavailable(record.kind.write_error(), err))?;

        tracing::debug!(log = record.kind.file_name(), "appended record");
        Ok(())
    }

    /// Read every stored object from a log, preserving file order.
    ///
    /// A log that was never created reads as empty. Blank lines, lines that
    /// fail to parse, and lines holding non-object values (a torn trailing
    /// write, say) are dropped without reporting: the rest of the log stays
    /// available. Only a failure to open the existing file is an error.
    pub fn read_all(&self, kind: LogKind) -> StoreResult<Vec<Value>> {
        let path = self.log_path(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)
            .map_err(|err| StoreError::unavailable(kind.read_error(), err))?;
        let reader = BufReader::new(file);

        let mut rows = Vec::new();
        for line in reader.lines() {
            let Ok(text) = line else {
                // Undecodable bytes mid-file get the same treatment as
                // unparseable lines.
                tracing::debug!(log = kind.file_name(), "skipping unreadable line");
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(value @ Value::Object(_)) => rows.push(value),
                Ok(_) | Err(_) => {
                    tracing::debug!(log = kind.file_name(), "skipping unparseable line");
                }
            }
        }

        Ok(rows)
    }
}
