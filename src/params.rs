//! Parameter sets for leveled homomorphic scoring.
//!
//! The modulus chain and ring dimension fix how many rescaling levels a
//! computation may consume. The scoring circuit needs three, so the
//! production preset carries a chain of four primes.

use serde::{Deserialize, Serialize};

use crate::digest;

/// 60-bit NTT-friendly prime, q ≡ 1 (mod 2^14): 2^60 - 2^14 + 1.
pub const Q60: u64 = 1152921504606830593;
/// 40-bit NTT-friendly primes, each ≡ 1 (mod 2^14), close to 2^40.
pub const Q40A: u64 = 1099511480321;
pub const Q40B: u64 = 1099510890497;
pub const Q40C: u64 = 1099510824961;

/// Security level for parameter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// 128-bit security (recommended).
    Bits128,
    /// Not security-calibrated; for capacity demonstrations and tests.
    Demo,
}

/// Core cryptographic parameters for the approximate-arithmetic scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CkksParams {
    /// Ring dimension n (power of two). Encodes n/2 real slots.
    pub ring_dim: usize,

    /// Modulus chain q_0..q_L, largest (base) prime first.
    /// Each must be NTT-friendly: q ≡ 1 (mod 2n).
    pub moduli: Vec<u64>,

    /// Encoding scale Δ = 2^scale_bits.
    pub scale_bits: u32,

    /// Standard deviation for Gaussian error sampling.
    pub sigma: f64,

    /// Bit width of the key-switching gadget base.
    pub gadget_base_bits: u32,

    /// Target security level.
    pub security_level: SecurityLevel,
}

impl CkksParams {
    /// 128-bit secure parameters with three multiplicative levels.
    ///
    /// n = 8192 supports ~218 modulus bits at 128-bit security; this chain
    /// uses 180, leaving margin. The 60-bit base prime keeps the final
    /// level's scale headroom after three rescalings by ~2^40.
    pub fn secure_8192() -> Self {
        Self {
            ring_dim: 8192,
            moduli: vec![Q60, Q40A, Q40B, Q40C],
            scale_bits: 40,
            sigma: 3.2,
            gadget_base_bits: 16,
            security_level: SecurityLevel::Bits128,
        }
    }

    /// Shallow chain with a single multiplicative level.
    ///
    /// Too few levels for the scoring circuit; exists to exercise the
    /// capacity-exhaustion path and to keep tests fast.
    pub fn shallow_2048() -> Self {
        Self {
            ring_dim: 2048,
            moduli: vec![Q60, Q40A],
            scale_bits: 40,
            sigma: 3.2,
            gadget_base_bits: 16,
            security_level: SecurityLevel::Demo,
        }
    }

    /// Build a custom parameter set. Callers should `validate()` the result.
    pub fn custom(ring_dim: usize, moduli: Vec<u64>, scale_bits: u32) -> Self {
        Self {
            ring_dim,
            moduli,
            scale_bits,
            sigma: crate::math::DEFAULT_SIGMA,
            gadget_base_bits: 16,
            security_level: SecurityLevel::Demo,
        }
    }

    /// Number of plaintext slots: n/2.
    pub fn slots(&self) -> usize {
        self.ring_dim / 2
    }

    /// Multiplicative levels available on a fresh ciphertext.
    pub fn levels(&self) -> usize {
        self.moduli.len().saturating_sub(1)
    }

    /// Encoding scale Δ as a float.
    pub fn scale(&self) -> f64 {
        (1u64 << self.scale_bits) as f64
    }

    /// Check if parameters are valid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.ring_dim.is_power_of_two() || self.ring_dim < 8 {
            return Err("ring_dim must be a power of two, at least 8");
        }
        if self.moduli.len() < 2 {
            return Err("modulus chain needs a base prime and at least one level");
        }
        let two_n = 2 * self.ring_dim as u64;
        for &q in &self.moduli {
            if q % two_n != 1 {
                return Err("every modulus must be ≡ 1 (mod 2n) for NTT");
            }
            if q >= 1 << 62 {
                return Err("moduli must stay below 2^62");
            }
        }
        for (i, &q) in self.moduli.iter().enumerate() {
            if self.moduli[i + 1..].contains(&q) {
                return Err("moduli must be distinct");
            }
        }
        if !(20..=50).contains(&self.scale_bits) {
            return Err("scale_bits must be between 20 and 50");
        }
        if !(self.sigma > 0.0) {
            return Err("sigma must be positive");
        }
        if !(1..=32).contains(&self.gadget_base_bits) {
            return Err("gadget_base_bits must be between 1 and 32");
        }
        Ok(())
    }

    /// Stable fingerprint over every parameter that affects compatibility.
    ///
    /// Two parties can operate on the same ciphertext only when their
    /// parameter fingerprints agree; contexts and ciphertexts both carry
    /// this value.
    pub fn fingerprint(&self) -> u64 {
        let mut buf = Vec::with_capacity(32 + 8 * self.moduli.len());
        buf.extend_from_slice(&(self.ring_dim as u64).to_le_bytes());
        buf.extend_from_slice(&self.scale_bits.to_le_bytes());
        buf.extend_from_slice(&self.gadget_base_bits.to_le_bytes());
        buf.extend_from_slice(&self.sigma.to_bits().to_le_bytes());
        for &q in &self.moduli {
            buf.extend_from_slice(&q.to_le_bytes());
        }
        digest::params_fingerprint(&buf)
    }
}

impl Default for CkksParams {
    fn default() -> Self {
        Self::secure_8192()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(CkksParams::secure_8192().validate().is_ok());
        assert!(CkksParams::shallow_2048().validate().is_ok());
    }

    #[test]
    fn test_slots_and_levels() {
        let p = CkksParams::secure_8192();
        assert_eq!(p.slots(), 4096);
        assert_eq!(p.levels(), 3);
        assert_eq!(p.scale(), (1u64 << 40) as f64);

        let s = CkksParams::shallow_2048();
        assert_eq!(s.slots(), 1024);
        assert_eq!(s.levels(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_modulus() {
        let mut p = CkksParams::secure_8192();
        // 3 is not ≡ 1 mod 2n.
        p.moduli.push(3);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_modulus() {
        let mut p = CkksParams::secure_8192();
        p.moduli.push(Q40A);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_chain() {
        let p = CkksParams::custom(2048, vec![Q60], 40);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_parameters() {
        let a = CkksParams::secure_8192();
        let b = CkksParams::secure_8192();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = CkksParams::secure_8192();
        c.moduli.pop();
        assert_ne!(a.fingerprint(), c.fingerprint());

        let mut d = CkksParams::secure_8192();
        d.scale_bits = 35;
        assert_ne!(a.fingerprint(), d.fingerprint());

        assert_ne!(a.fingerprint(), CkksParams::shallow_2048().fingerprint());
    }
}
