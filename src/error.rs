//! Crate-wide error type.
//!
//! Every failure a caller can act on is a distinct variant; cryptographic
//! and integrity failures are never collapsed into a default value.

use crate::ledger::LedgerError;

/// Errors surfaced by vault, codec, evaluator and protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wrong symmetric key or tampered envelope. Fatal for the session;
    /// never retried with the same inputs.
    #[error("envelope authentication failed")]
    Authentication,

    /// Structurally invalid envelope, ciphertext or artifact.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Artifacts produced under incompatible parameters were mixed.
    #[error("context mismatch: {0}")]
    ContextMismatch(String),

    /// A ciphertext was paired with a private context that did not
    /// produce it.
    #[error("wrong context for ciphertext: {0}")]
    WrongContext(String),

    /// Vector is too long for the context's slot capacity.
    #[error("vector of length {len} exceeds packing capacity {capacity}")]
    CapacityExceeded { len: usize, capacity: usize },

    /// The requested multiplicative depth exceeds what the parameters
    /// provision. Regenerate the context with a deeper modulus chain.
    #[error("noise budget exhausted: {required} multiplicative levels required, {available} available")]
    NoiseBudgetExhausted { required: usize, available: usize },

    /// Parameter validation failed.
    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),

    /// A protocol operation was invoked out of order.
    #[error("invalid protocol state: {0}")]
    InvalidState(String),

    /// Ledger submission or query failed. Transient; callers may retry
    /// with backoff, but this is never a successful verification.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Digest or ledger verification failed: the result cannot be trusted.
    #[error("integrity verification failed: {0}")]
    IntegrityMismatch(String),

    /// The OS entropy source failed.
    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors a caller may retry after backoff. Everything else
    /// is fatal for the session that produced it.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Ledger(LedgerError::Unavailable(_)))
    }
}
