//! Client-side session state machine.
//!
//! A session owns everything scoped to one inference: the homomorphic
//! context, the sealed request, the retained digests and the decoded
//! outcome. Steps run in a fixed order; a step failure tears the session
//! down and zeroizes its secrets. The one exception is a transient ledger
//! outage during verification, which leaves the session retryable.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ckks::{Ciphertext, PrivateContext};
use crate::digest::{self, Digest};
use crate::error::{Error, Result};
use crate::ledger::IntegrityLedger;
use crate::math::NoiseSampler;
use crate::params::CkksParams;
use crate::vault::{self, Envelope, SymmetricKey};

use super::RequestBundle;

/// Protocol position of a session. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Init,
    ContextReady,
    ClientEncrypted,
    Transmitted,
    ServerEvaluated,
    ResultTransmitted,
    ClientDecoded,
    Verified,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "Init",
            SessionState::ContextReady => "ContextReady",
            SessionState::ClientEncrypted => "ClientEncrypted",
            SessionState::Transmitted => "Transmitted",
            SessionState::ServerEvaluated => "ServerEvaluated",
            SessionState::ResultTransmitted => "ResultTransmitted",
            SessionState::ClientDecoded => "ClientDecoded",
            SessionState::Verified => "Verified",
            SessionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Random identifier scoping a session's artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn fresh() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| Error::MalformedInput(format!("not a session id: {s:?}")))
    }
}

/// Decoded scoring decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Slot-zero value as decoded, before clamping.
    pub raw_score: f64,
    /// Raw score clamped into [0, 1].
    pub probability: f64,
    /// Probability thresholded at 0.5.
    pub approved: bool,
}

impl Outcome {
    pub fn from_raw(raw: f64) -> Self {
        let probability = raw.clamp(0.0, 1.0);
        Self {
            raw_score: raw,
            probability,
            approved: probability >= 0.5,
        }
    }
}

/// One inference, client side.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    state: SessionState,
    vault_key: Arc<SymmetricKey>,
    private: Option<PrivateContext>,
    request_envelope: Option<Envelope>,
    request_digest: Option<Digest>,
    result_digest: Option<Digest>,
    outcome: Option<Outcome>,
}

impl ClientSession {
    /// Open a fresh session around an injected long-lived vault key.
    pub fn new(vault_key: Arc<SymmetricKey>) -> Self {
        Self {
            id: SessionId::fresh(),
            state: SessionState::Init,
            vault_key,
            private: None,
            request_envelope: None,
            request_digest: None,
            result_digest: None,
            outcome: None,
        }
    }

    /// Rebuild a session that already transmitted its request, from
    /// persisted artifacts. Used by the decode half of the CLI.
    pub fn resume_transmitted(
        id: SessionId,
        vault_key: Arc<SymmetricKey>,
        private: PrivateContext,
        request_envelope: Envelope,
    ) -> Self {
        let request_digest = digest::request_digest(request_envelope.as_bytes());
        Self {
            id,
            state: SessionState::Transmitted,
            vault_key,
            private: Some(private),
            request_envelope: Some(request_envelope),
            request_digest: Some(request_digest),
            result_digest: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn request_digest(&self) -> Option<Digest> {
        self.request_digest
    }

    pub fn result_digest(&self) -> Option<Digest> {
        self.result_digest
    }

    pub fn private_context(&self) -> Option<&PrivateContext> {
        self.private.as_ref()
    }

    pub fn request_envelope(&self) -> Option<&Envelope> {
        self.request_envelope.as_ref()
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "session {} is {}, step requires {}",
                self.id, self.state, expected
            )));
        }
        Ok(())
    }

    /// Generate the session's homomorphic context. CPU-bound; runs to
    /// completion or leaves no context behind.
    pub fn establish_context(
        &mut self,
        params: CkksParams,
        sampler: &mut NoiseSampler,
    ) -> Result<()> {
        self.expect_state(SessionState::Init)?;
        let started = Instant::now();
        match PrivateContext::generate(params, sampler) {
            Ok(private) => {
                info!(
                    "session {}: context ready (n={}, {} levels, {:?})",
                    self.id,
                    private.params().ring_dim,
                    private.params().levels(),
                    started.elapsed()
                );
                self.private = Some(private);
                self.state = SessionState::ContextReady;
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Encrypt and seal a prepared feature vector; retains the envelope
    /// and its digest for later verification.
    pub fn encrypt_request(
        &mut self,
        features: &[f64],
        sampler: &mut NoiseSampler,
    ) -> Result<RequestBundle> {
        self.expect_state(SessionState::ContextReady)?;
        match self.do_encrypt_request(features, sampler) {
            Ok(bundle) => {
                self.state = SessionState::ClientEncrypted;
                Ok(bundle)
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn do_encrypt_request(
        &mut self,
        features: &[f64],
        sampler: &mut NoiseSampler,
    ) -> Result<RequestBundle> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::InvalidState("session carries no context".into()))?;
        let ct = private.encrypt_vector(features, sampler)?;
        let envelope = vault::seal(&self.vault_key, &ct.to_bytes()?)?;
        let request_digest = digest::request_digest(envelope.as_bytes());
        let public_context = private.derive_public().to_bytes()?;
        info!(
            "session {}: request sealed ({} features, digest {})",
            self.id,
            features.len(),
            request_digest.short()
        );
        self.request_envelope = Some(envelope.clone());
        self.request_digest = Some(request_digest);
        Ok(RequestBundle {
            public_context,
            request: envelope,
        })
    }

    /// Record that the request bundle left the client.
    pub fn mark_transmitted(&mut self) -> Result<()> {
        self.expect_state(SessionState::ClientEncrypted)?;
        self.state = SessionState::Transmitted;
        Ok(())
    }

    /// Open and decode the sealed result; clamps slot zero into [0, 1]
    /// and thresholds at 0.5.
    pub fn accept_result(&mut self, result: &Envelope) -> Result<Outcome> {
        self.expect_state(SessionState::Transmitted)?;
        self.state = SessionState::ResultTransmitted;
        match self.do_accept_result(result) {
            Ok(outcome) => {
                self.state = SessionState::ClientDecoded;
                Ok(outcome)
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn do_accept_result(&mut self, result: &Envelope) -> Result<Outcome> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::InvalidState("session carries no context".into()))?;
        let plain = vault::open(&self.vault_key, result)?;
        let ct = Ciphertext::from_bytes(&plain)?;
        let values = private.decrypt_vector(&ct)?;
        let raw = values
            .first()
            .copied()
            .ok_or_else(|| Error::MalformedInput("result decodes to no slots".into()))?;
        if !raw.is_finite() {
            return Err(Error::MalformedInput(format!(
                "result decodes to non-finite score {raw}"
            )));
        }
        let outcome = Outcome::from_raw(raw);
        self.result_digest = Some(digest::result_digest(result.as_bytes()));
        self.outcome = Some(outcome);
        info!(
            "session {}: result decoded (probability {:.4}, {})",
            self.id,
            outcome.probability,
            if outcome.approved { "approve" } else { "deny" }
        );
        Ok(outcome)
    }

    /// Confirm with the ledger that the digest pair this session holds is
    /// the pair the server committed.
    ///
    /// A transient ledger error leaves the session in `ClientDecoded` for
    /// retry; a mismatch or an unlogged pair is terminal.
    pub fn verify(&mut self, ledger: &dyn IntegrityLedger) -> Result<Outcome> {
        self.expect_state(SessionState::ClientDecoded)?;
        let envelope = self
            .request_envelope
            .as_ref()
            .ok_or_else(|| Error::InvalidState("session retains no request envelope".into()))?;
        let recomputed = digest::request_digest(envelope.as_bytes());
        let stored = self
            .request_digest
            .ok_or_else(|| Error::InvalidState("session retains no request digest".into()))?;
        if recomputed != stored {
            self.fail();
            return Err(Error::IntegrityMismatch(
                "retained request digest does not match the sealed envelope".into(),
            ));
        }
        let result_digest = self
            .result_digest
            .ok_or_else(|| Error::InvalidState("session retains no result digest".into()))?;

        match ledger.verify(&recomputed, &result_digest) {
            Err(e) => {
                let err = Error::from(e);
                if err.is_transient() {
                    warn!(
                        "session {}: ledger unavailable, verification deferred",
                        self.id
                    );
                    Err(err)
                } else {
                    self.fail();
                    Err(err)
                }
            }
            Ok(false) => {
                let msg = format!(
                    "ledger holds no record for pair ({}, {})",
                    recomputed.short(),
                    result_digest.short()
                );
                self.fail();
                Err(Error::IntegrityMismatch(msg))
            }
            Ok(true) => {
                let outcome = self
                    .outcome
                    .ok_or_else(|| Error::InvalidState("session retains no outcome".into()))?;
                self.state = SessionState::Verified;
                info!("session {}: integrity verified", self.id);
                Ok(outcome)
            }
        }
    }

    /// Tear the session down: drop context (zeroizing the secret key),
    /// envelope, digests and outcome. Terminal and idempotent.
    pub fn fail(&mut self) {
        if self.state == SessionState::Failed {
            return;
        }
        warn!("session {}: failed from {}, dropping secrets", self.id, self.state);
        self.private = None;
        self.request_envelope = None;
        self.request_digest = None;
        self.result_digest = None;
        self.outcome = None;
        self.state = SessionState::Failed;
    }
}
