//! CloakScore: privacy-preserving credit scoring on encrypted features
//!
//! A client encrypts its feature vector under a session-scoped CKKS-style
//! homomorphic context; the scoring service evaluates a fixed logistic
//! model entirely on ciphertext and never sees features, score or a
//! decryption key.
//!
//! Key components:
//! - CKKS-style RNS arithmetic: negacyclic NTT, canonical-embedding
//!   encoding, digit-gadget key switching, rescaling
//! - Sealed AES-256-GCM envelopes around every ciphertext in transit
//! - An append-only integrity ledger binding each request digest to the
//!   result digest the server produced for it
//! - A sequential client/server protocol with explicit failure semantics

pub mod ckks;
pub mod digest;
pub mod error;
pub mod ledger;
pub mod math;
pub mod model;
pub mod params;
pub mod protocol;
pub mod vault;

#[cfg(feature = "server")]
pub mod http;

pub use ckks::{
    plain_score, sigmoid_approx, Ciphertext, PrivateContext, PublicContext, CIRCUIT_DEPTH,
};
pub use error::{Error, Result};
pub use ledger::{
    FileLedger, IntegrityLedger, IntegrityRecord, LedgerError, MemoryLedger, RecordId,
};
pub use math::NoiseSampler;
pub use model::{FeatureScaler, LinearModel, ModelArtifact};
pub use params::{CkksParams, SecurityLevel};
pub use protocol::{
    ArtifactStore, ClientSession, EvaluationReceipt, Outcome, RequestBundle, ServerEngine,
    SessionId, SessionMeta, SessionState,
};
pub use vault::{Envelope, SymmetricKey};
