//! Server-side evaluation engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ckks::{Ciphertext, PublicContext};
use crate::digest::{self, Digest};
use crate::error::Result;
use crate::ledger::{IntegrityLedger, IntegrityRecord, RecordId};
use crate::model::LinearModel;
use crate::vault::{self, Envelope, SymmetricKey};

use super::RequestBundle;

/// Proof of processing returned alongside the result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReceipt {
    pub record_id: RecordId,
    pub request_digest: Digest,
    pub result_digest: Digest,
}

/// Stateless blind evaluator.
///
/// Holds the model, the vault key and a ledger handle; sees ciphertexts
/// and public contexts only, never plaintext features or a private key.
#[derive(Debug)]
pub struct ServerEngine<L: IntegrityLedger> {
    model: LinearModel,
    vault_key: Arc<SymmetricKey>,
    ledger: L,
}

impl<L: IntegrityLedger> ServerEngine<L> {
    pub fn new(model: LinearModel, vault_key: Arc<SymmetricKey>, ledger: L) -> Self {
        Self {
            model,
            vault_key,
            ledger,
        }
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Run one evaluation: open, score, re-seal, commit the digest pair,
    /// return the sealed result with its receipt.
    ///
    /// The ledger commit happens before the result is released; a ledger
    /// failure fails the whole evaluation.
    pub fn process(&self, bundle: &RequestBundle) -> Result<(Envelope, EvaluationReceipt)> {
        let public = PublicContext::from_bytes(&bundle.public_context)?;
        debug!(
            "request under context {:016x} (n={})",
            public.fingerprint(),
            public.params().ring_dim
        );
        let request_bytes = vault::open(&self.vault_key, &bundle.request)?;
        let ct = Ciphertext::from_bytes(&request_bytes)?;
        ct.validate_for(public.params())?;

        let scored = public.evaluate_model(&ct, &self.model)?;
        let result = vault::seal(&self.vault_key, &scored.to_bytes()?)?;

        let request_digest = digest::request_digest(bundle.request.as_bytes());
        let result_digest = digest::result_digest(result.as_bytes());
        let record_id = self.ledger.record(IntegrityRecord {
            input: request_digest,
            output: result_digest,
        })?;
        info!(
            "evaluated request {} -> result {} (ledger record {})",
            request_digest.short(),
            result_digest.short(),
            record_id
        );
        Ok((
            result,
            EvaluationReceipt {
                record_id,
                request_digest,
                result_digest,
            },
        ))
    }
}
