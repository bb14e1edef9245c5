//! Append-only integrity ledger.
//!
//! The server commits one (request digest, result digest) pair per
//! inference; the client later asks whether the pair it holds is the pair
//! the server committed. The ledger is modeled as an external append-only
//! commit service: submissions and queries can fail, and a failure is
//! always a typed error, never a silent verification answer.

mod file;
mod memory;

pub use file::FileLedger;
pub use memory::MemoryLedger;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Failures of the ledger service itself.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The service could not be reached or did not answer. Retryable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The committed log does not parse. Not retryable.
    #[error("ledger corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Unavailable(e.to_string())
    }
}

/// Position of a committed record within the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed (input, output) digest pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    pub input: Digest,
    pub output: Digest,
}

/// Append-only store of integrity records.
///
/// Implementations are duplicate-blind: recording the same pair twice
/// creates two records, and lookups resolve to the earliest match.
pub trait IntegrityLedger: Send + Sync {
    /// Append a record and return its position. Never idempotent.
    fn record(&self, record: IntegrityRecord) -> Result<RecordId, LedgerError>;

    /// Input digest of the earliest record carrying this output digest.
    fn lookup_input_for(&self, output: &Digest) -> Result<Option<Digest>, LedgerError>;

    /// True iff some record carries exactly this pair.
    fn verify(&self, input: &Digest, output: &Digest) -> Result<bool, LedgerError>;
}
