//! Append-only JSON-lines ledger on local disk.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

use super::{IntegrityLedger, IntegrityRecord, LedgerError, RecordId};

/// One line of the on-disk log. Digests travel as lowercase hex so the
/// file stays greppable.
#[derive(Serialize, Deserialize)]
struct Line {
    id: u64,
    input: String,
    output: String,
}

/// Ledger backed by a JSON-lines file.
///
/// Every record appends one line and syncs it; a missing file reads as an
/// empty ledger so the first record creates it.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl FileLedger {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed records.
    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.read_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.read_all()?.is_empty())
    }

    fn read_all(&self) -> Result<Vec<IntegrityRecord>, LedgerError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: Line = serde_json::from_str(&line)
                .map_err(|e| LedgerError::Corrupt(format!("line {}: {e}", idx + 1)))?;
            let input = Digest::from_hex(&parsed.input).ok_or_else(|| {
                LedgerError::Corrupt(format!("line {}: unparseable input digest", idx + 1))
            })?;
            let output = Digest::from_hex(&parsed.output).ok_or_else(|| {
                LedgerError::Corrupt(format!("line {}: unparseable output digest", idx + 1))
            })?;
            records.push(IntegrityRecord { input, output });
        }
        Ok(records)
    }
}

impl IntegrityLedger for FileLedger {
    fn record(&self, record: IntegrityRecord) -> Result<RecordId, LedgerError> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))?;
        let id = self.read_all()?.len() as u64;
        let line = serde_json::to_string(&Line {
            id,
            input: record.input.to_string(),
            output: record.output.to_string(),
        })
        .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(RecordId(id))
    }

    fn lookup_input_for(&self, output: &Digest) -> Result<Option<Digest>, LedgerError> {
        Ok(self
            .read_all()?
            .iter()
            .find(|r| r.output == *output)
            .map(|r| r.input))
    }

    fn verify(&self, input: &Digest, output: &Digest) -> Result<bool, LedgerError> {
        Ok(self
            .read_all()?
            .iter()
            .any(|r| r.input == *input && r.output == *output))
    }
}
