//! Ciphertext container and checked (de)serialization.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::RnsPoly;
use crate::params::CkksParams;

/// An RLWE ciphertext (c0, c1) with c0 + c1·s ≈ Δ·m.
///
/// Both components are kept in the NTT domain so additions and Hadamard
/// products apply directly. The limb count of the components tracks the
/// remaining level: rescaling drops the last limb of both.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ciphertext {
    pub c0: RnsPoly,
    pub c1: RnsPoly,
    /// Current encoding scale. Drifts away from Δ as rescalings divide
    /// by chain primes rather than exact powers of two.
    pub scale: f64,
    /// Fingerprint of the parameter set this ciphertext lives under.
    pub fingerprint: u64,
}

impl Ciphertext {
    /// Multiplicative levels still available.
    pub fn level(&self) -> usize {
        self.c0.limb_count().saturating_sub(1)
    }

    /// Active limb count.
    pub fn limb_count(&self) -> usize {
        self.c0.limb_count()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a ciphertext from bytes without yet binding it to parameters.
    ///
    /// Callers must follow up with [`Ciphertext::validate_for`] before
    /// operating on the result.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::MalformedInput(format!("ciphertext decode: {e}")))
    }

    /// Structural validation against a parameter set.
    ///
    /// Checks component shapes, residue ranges, and the parameter
    /// fingerprint, so arithmetic after a successful call cannot index out
    /// of range or mix incompatible moduli.
    pub fn validate_for(&self, params: &CkksParams) -> Result<()> {
        if self.fingerprint != params.fingerprint() {
            return Err(Error::WrongContext(format!(
                "ciphertext fingerprint {:016x} does not match parameters {:016x}",
                self.fingerprint,
                params.fingerprint()
            )));
        }
        let k = self.c0.limb_count();
        if k == 0 || k > params.moduli.len() {
            return Err(Error::MalformedInput(format!(
                "ciphertext has {} limbs, parameters allow 1..={}",
                k,
                params.moduli.len()
            )));
        }
        if self.c1.limb_count() != k {
            return Err(Error::MalformedInput(
                "ciphertext components disagree on limb count".into(),
            ));
        }
        for part in [&self.c0, &self.c1] {
            for (limb, &q) in part.limbs.iter().zip(&params.moduli) {
                if limb.len() != params.ring_dim {
                    return Err(Error::MalformedInput(format!(
                        "component length {} does not match ring dimension {}",
                        limb.len(),
                        params.ring_dim
                    )));
                }
                if limb.iter().any(|&c| c >= q) {
                    return Err(Error::MalformedInput(
                        "ciphertext residue out of range for its modulus".into(),
                    ));
                }
            }
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::MalformedInput(format!(
                "ciphertext scale {} is not a positive finite value",
                self.scale
            )));
        }
        Ok(())
    }
}
