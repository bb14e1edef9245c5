//! Key material and the encrypt/decrypt entry points.
//!
//! A [`PrivateContext`] owns the secret key and is generated client-side;
//! the [`PublicContext`] derived from it carries the parameters and
//! evaluation keys a server needs to compute on ciphertexts, and nothing
//! that would let it decrypt them. Both serialize with `bincode`; the
//! public form is what travels with a scoring request.

use std::sync::OnceLock;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::ckks::ciphertext::Ciphertext;
use crate::ckks::encoding::CkksEncoder;
use crate::ckks::galois::{apply_automorphism_ternary, rotation_element};
use crate::ckks::keyswitch::KeySwitchKey;
use crate::error::{Error, Result};
use crate::math::ntt::{forward_rns, inverse_rns, NttTables};
use crate::math::rns::RnsPoly;
use crate::math::sampler::NoiseSampler;
use crate::params::CkksParams;

/// Precomputed per-parameter state: encoder plus one NTT table per limb.
///
/// Rebuilt lazily after deserialization instead of being shipped.
#[derive(Clone, Debug)]
pub(crate) struct Runtime {
    pub(crate) encoder: CkksEncoder,
    pub(crate) tables: Vec<NttTables>,
}

impl Runtime {
    fn build(params: &CkksParams) -> Result<Self> {
        let tables = params
            .moduli
            .iter()
            .map(|&q| {
                NttTables::new(params.ring_dim, q).ok_or(Error::InvalidParams(
                    "modulus does not support the ring dimension",
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            encoder: CkksEncoder::new(params.ring_dim),
            tables,
        })
    }
}

/// Ternary secret key, kept in both signed and NTT form.
///
/// Wiped on drop. Serialized only as part of a [`PrivateContext`], which
/// never leaves the client.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    ternary: Vec<i8>,
    s_ntt: RnsPoly,
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.ternary.zeroize();
        for limb in &mut self.s_ntt.limbs {
            limb.zeroize();
        }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey").finish_non_exhaustive()
    }
}

/// Evaluation keys: relinearization plus one rotation key per step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvalKeys {
    pub(crate) relin: KeySwitchKey,
    /// Rotation keys for every power-of-two step below the slot count.
    pub(crate) rotations: Vec<(usize, KeySwitchKey)>,
}

/// Everything a server needs to evaluate on ciphertexts.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicContext {
    pub(crate) params: CkksParams,
    pub(crate) fingerprint: u64,
    pub(crate) eval: EvalKeys,
    #[serde(skip, default)]
    pub(crate) runtime: OnceLock<Runtime>,
}

impl Clone for PublicContext {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            fingerprint: self.fingerprint,
            eval: self.eval.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

/// Client-side context: the public half plus the secret key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrivateContext {
    pub(crate) public: PublicContext,
    pub(crate) secret: SecretKey,
}

impl PublicContext {
    pub fn params(&self) -> &CkksParams {
        &self.params
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub(crate) fn runtime(&self) -> Result<&Runtime> {
        if self.runtime.get().is_none() {
            let rt = Runtime::build(&self.params)?;
            let _ = self.runtime.set(rt);
        }
        self.runtime
            .get()
            .ok_or(Error::InvalidParams("runtime initialization failed"))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode and validate a public context received from a client.
    ///
    /// The stored fingerprint must match one recomputed from the decoded
    /// parameters, so a payload whose parameters were altered in transit
    /// fails here rather than corrupting an evaluation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let ctx: Self = bincode::deserialize(bytes)
            .map_err(|e| Error::MalformedInput(format!("context decode: {e}")))?;
        ctx.params.validate().map_err(Error::InvalidParams)?;
        if ctx.fingerprint != ctx.params.fingerprint() {
            return Err(Error::ContextMismatch(format!(
                "stored fingerprint {:016x} does not match parameters {:016x}",
                ctx.fingerprint,
                ctx.params.fingerprint()
            )));
        }
        Ok(ctx)
    }
}

impl PrivateContext {
    /// Generate a fresh key set for the given parameters.
    ///
    /// Produces the secret key, the relinearization key, and rotation
    /// keys for every power-of-two step below the slot count. Rotation
    /// keys are generated in parallel, each from its own forked noise
    /// stream so results are reproducible under a seeded sampler.
    pub fn generate(params: CkksParams, sampler: &mut NoiseSampler) -> Result<Self> {
        params.validate().map_err(Error::InvalidParams)?;
        let runtime = Runtime::build(&params)?;
        let n = params.ring_dim;
        let moduli = &params.moduli;

        let ternary = sampler.sample_ternary(n);
        let signed: Vec<i64> = ternary.iter().map(|&c| c as i64).collect();
        let mut s_ntt = RnsPoly::from_signed(&signed, moduli);
        forward_rns(&mut s_ntt, &runtime.tables);

        let s_sq = s_ntt.hadamard(&s_ntt, moduli);
        let relin = KeySwitchKey::generate(&s_sq, &s_ntt, &params, &runtime.tables, sampler);

        let steps: Vec<usize> = std::iter::successors(Some(1usize), |&s| Some(s * 2))
            .take_while(|&s| s < params.slots())
            .collect();
        let mut forks: Vec<(usize, NoiseSampler)> =
            steps.iter().map(|&step| (step, sampler.fork())).collect();
        let rotations: Vec<(usize, KeySwitchKey)> = forks
            .par_iter_mut()
            .map(|(step, fork)| {
                let g = rotation_element(*step, n);
                let rotated = apply_automorphism_ternary(&ternary, g);
                let rot_signed: Vec<i64> = rotated.iter().map(|&c| c as i64).collect();
                let mut target = RnsPoly::from_signed(&rot_signed, moduli);
                forward_rns(&mut target, &runtime.tables);
                let key = KeySwitchKey::generate(&target, &s_ntt, &params, &runtime.tables, fork);
                (*step, key)
            })
            .collect();

        let fingerprint = params.fingerprint();
        Ok(Self {
            public: PublicContext {
                params,
                fingerprint,
                eval: EvalKeys { relin, rotations },
                runtime: OnceLock::from(runtime),
            },
            secret: SecretKey { ternary, s_ntt },
        })
    }

    pub fn params(&self) -> &CkksParams {
        &self.public.params
    }

    pub fn fingerprint(&self) -> u64 {
        self.public.fingerprint
    }

    /// The shareable half of this context.
    pub fn derive_public(&self) -> PublicContext {
        self.public.clone()
    }

    /// Encrypt a real vector into a fresh full-level ciphertext.
    pub fn encrypt_vector(
        &self,
        values: &[f64],
        sampler: &mut NoiseSampler,
    ) -> Result<Ciphertext> {
        let rt = self.public.runtime()?;
        let params = &self.public.params;
        let moduli = &params.moduli;

        let mut m = rt.encoder.encode(values, params.scale(), moduli)?;
        forward_rns(&mut m, &rt.tables);
        let a = sampler.sample_uniform_rns(params.ring_dim, moduli);
        let mut e = sampler.sample_error_rns(params.ring_dim, moduli);
        forward_rns(&mut e, &rt.tables);

        // c0 + c1·s = m + e under the secret key.
        let c0 = m
            .add(&e, moduli)
            .sub(&a.hadamard(&self.secret.s_ntt, moduli), moduli);
        Ok(Ciphertext {
            c0,
            c1: a,
            scale: params.scale(),
            fingerprint: self.public.fingerprint,
        })
    }

    /// Decrypt a ciphertext at any level back to a real vector.
    pub fn decrypt_vector(&self, ct: &Ciphertext) -> Result<Vec<f64>> {
        ct.validate_for(&self.public.params)?;
        let rt = self.public.runtime()?;
        let k = ct.limb_count();
        let moduli = &self.public.params.moduli[..k];

        let s = self.secret.s_ntt.truncated(k);
        let mut m = ct.c0.add(&ct.c1.hadamard(&s, moduli), moduli);
        inverse_rns(&mut m, &rt.tables[..k]);
        Ok(rt
            .encoder
            .decode(&m, ct.scale, self.public.params.moduli[0]))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let ctx: Self = bincode::deserialize(bytes)
            .map_err(|e| Error::MalformedInput(format!("context decode: {e}")))?;
        ctx.public.params.validate().map_err(Error::InvalidParams)?;
        if ctx.public.fingerprint != ctx.public.params.fingerprint() {
            return Err(Error::ContextMismatch(
                "stored fingerprint does not match parameters".into(),
            ));
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Q40A, Q40B, Q40C, Q60};

    fn test_params() -> CkksParams {
        CkksParams::custom(64, vec![Q60, Q40A, Q40B, Q40C], 40)
    }

    fn test_context(seed: u64) -> PrivateContext {
        let mut sampler = NoiseSampler::with_seed(3.2, seed);
        PrivateContext::generate(test_params(), &mut sampler).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let ctx = test_context(1);
        let mut sampler = NoiseSampler::with_seed(3.2, 2);
        let values: Vec<f64> = (0..32).map(|i| (i as f64) * 0.125 - 2.0).collect();
        let ct = ctx.encrypt_vector(&values, &mut sampler).unwrap();
        assert_eq!(ct.level(), 3);
        let decrypted = ctx.decrypt_vector(&ct).unwrap();
        for (got, want) in decrypted.iter().zip(&values) {
            assert!(
                (got - want).abs() < 1e-6,
                "decrypted {} expected {}",
                got,
                want
            );
        }
    }

    #[test]
    fn test_ciphertexts_are_randomized() {
        let ctx = test_context(3);
        let mut sampler = NoiseSampler::with_seed(3.2, 4);
        let a = ctx.encrypt_vector(&[1.0, 2.0], &mut sampler).unwrap();
        let b = ctx.encrypt_vector(&[1.0, 2.0], &mut sampler).unwrap();
        assert_ne!(a.c1, b.c1);
        assert_ne!(a.c0, b.c0);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails_or_garbles() {
        let ctx1 = test_context(5);
        let ctx2 = test_context(6);
        let mut sampler = NoiseSampler::with_seed(3.2, 7);
        let ct = ctx1.encrypt_vector(&[1.5, -0.5], &mut sampler).unwrap();
        // Same parameters, different secret: decryption runs but yields noise.
        let wrong = ctx2.decrypt_vector(&ct).unwrap();
        assert!(
            (wrong[0] - 1.5).abs() > 1e-3,
            "foreign key should not recover the plaintext"
        );
    }

    #[test]
    fn test_decrypt_rejects_foreign_fingerprint() {
        let ctx = test_context(8);
        let mut sampler = NoiseSampler::with_seed(3.2, 9);
        let mut ct = ctx.encrypt_vector(&[0.25], &mut sampler).unwrap();
        ct.fingerprint ^= 0xdead;
        assert!(matches!(
            ctx.decrypt_vector(&ct),
            Err(Error::WrongContext(_))
        ));
    }

    #[test]
    fn test_rotation_keys_cover_power_of_two_steps() {
        let ctx = test_context(10);
        let steps: Vec<usize> = ctx.public.eval.rotations.iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_public_context_roundtrip() {
        let ctx = test_context(11);
        let public = ctx.derive_public();
        let bytes = public.to_bytes().unwrap();
        let back = PublicContext::from_bytes(&bytes).unwrap();
        assert_eq!(back.fingerprint(), ctx.fingerprint());
        assert_eq!(back.params(), ctx.params());
    }

    #[test]
    fn test_public_context_detects_parameter_tamper() {
        let ctx = test_context(12);
        let mut bytes = ctx.derive_public().to_bytes().unwrap();
        // First field is ring_dim; nudging it invalidates the context.
        bytes[0] ^= 1;
        assert!(PublicContext::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_private_context_roundtrip_decrypts() {
        let ctx = test_context(13);
        let mut sampler = NoiseSampler::with_seed(3.2, 14);
        let ct = ctx.encrypt_vector(&[0.5, 1.5, 2.5], &mut sampler).unwrap();
        let restored = PrivateContext::from_bytes(&ctx.to_bytes().unwrap()).unwrap();
        let decrypted = restored.decrypt_vector(&ct).unwrap();
        assert!((decrypted[0] - 0.5).abs() < 1e-6);
        assert!((decrypted[2] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_generation_is_reproducible_under_seed() {
        let a = test_context(20);
        let b = test_context(20);
        assert_eq!(a.secret.ternary, b.secret.ternary);
        let ra = &a.public.eval.relin.rows[0];
        let rb = &b.public.eval.relin.rows[0];
        assert_eq!(ra.b, rb.b);
    }
}
