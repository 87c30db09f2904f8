// audit.rs — Append-only JSONL decision log.
//
// One JSON object per line, one line per mediated request, flushed as it is
// written. Records carry a hash of the parameters rather than the
// parameters themselves, and never any token material, so the log is safe
// to ship to ordinary log sinks.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open decision log {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize decision record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write decision record: {0}")]
    Write(#[from] std::io::Error),
}

/// One mediated request and how it ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub record_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub account_id: String,
    /// SHA-256 over the JSON-encoded parameter map. The raw values stay out
    /// of the log; the hash still lets an auditor match a record against a
    /// known request.
    pub parameters_hash: String,
    /// "success", "denied", "elevation_required", or "failed".
    pub outcome: String,
    /// Deny reason, missing scopes, or error text, depending on outcome.
    pub detail: Option<String>,
}

impl DecisionRecord {
    pub fn new(
        operation: &str,
        account_id: &str,
        parameters_hash: String,
        outcome: &str,
        detail: Option<String>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation: operation.to_string(),
            account_id: account_id.to_string(),
            parameters_hash,
            outcome: outcome.to_string(),
            detail,
        }
    }
}

/// Hash arbitrary bytes to a lowercase hex SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// An append-only decision log backed by a JSONL file.
pub struct DecisionLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl DecisionLog {
    /// Open (or create) a decision log. Always appends, never truncates.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Append one record and flush it to the OS.
    pub fn append(&mut self, record: &DecisionRecord) -> Result<(), AuditError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    fn sample_record(outcome: &str) -> DecisionRecord {
        DecisionRecord::new(
            "mail.list_messages",
            "alice",
            hash_bytes(b"{}"),
            outcome,
            None,
        )
    }

    #[test]
    fn records_append_one_line_each() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");

        let mut log = DecisionLog::open(&path).unwrap();
        log.append(&sample_record("success")).unwrap();
        log.append(&sample_record("denied")).unwrap();
        drop(log);

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        let first: DecisionRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first.operation, "mail.list_messages");
        assert_eq!(first.outcome, "success");
    }

    #[test]
    fn reopen_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");

        DecisionLog::open(&path)
            .unwrap()
            .append(&sample_record("success"))
            .unwrap();
        DecisionLog::open(&path)
            .unwrap()
            .append(&sample_record("failed"))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = hash_bytes(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
