//! The inference protocol: client state machine, server engine, at-rest
//! artifacts.
//!
//! One inference is a strictly sequential pipeline. The client generates a
//! session-scoped homomorphic context, encrypts its features and seals
//! them for transport; the server opens the envelope, scores it blind,
//! seals the result and commits the (request, result) digest pair to the
//! ledger; the client decodes the result and refuses to trust it until
//! the ledger confirms the pair it holds. Concurrency exists only across
//! independent sessions.

mod artifacts;
mod server;
mod session;

pub use artifacts::{
    ArtifactStore, SessionMeta, LEDGER_FILE, PRIVATE_CONTEXT_FILE, PUBLIC_CONTEXT_FILE,
    REQUEST_ENVELOPE_FILE, RESULT_ENVELOPE_FILE, SESSION_META_FILE, VAULT_KEY_FILE,
};
pub use server::{EvaluationReceipt, ServerEngine};
pub use session::{ClientSession, Outcome, SessionId, SessionState};

use serde::{Deserialize, Serialize};

use crate::vault::Envelope;

/// Everything the server needs for one evaluation: the client's public
/// context and the sealed request.
#[derive(Clone, Serialize, Deserialize)]
pub struct RequestBundle {
    pub public_context: Vec<u8>,
    pub request: Envelope,
}

impl std::fmt::Debug for RequestBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBundle")
            .field("public_context", &format_args!("{} bytes", self.public_context.len()))
            .field("request", &self.request)
            .finish()
    }
}
