//! Digit-decomposition key switching.
//!
//! A key-switching key holds, for every (source limb, digit) pair, an
//! RLWE encryption of 2^shift · target under the owner's secret key. To
//! move a polynomial from key `target` to key `s`, decompose each of its
//! limbs into base-2^w digits and fold the digits against the matching
//! rows. Rows are generated over the full modulus chain but only the
//! rows whose source limb is still active participate, which is what
//! keeps one key usable at every level of a computation.
//!
//! Relinearization uses target = s², rotation keys use target = τ_g(s).

use serde::{Deserialize, Serialize};

use crate::math::ntt::{forward_rns, NttTables};
use crate::math::rns::{mod_add, mod_mul, RnsPoly};
use crate::math::sampler::NoiseSampler;
use crate::params::CkksParams;

/// One row: an encryption of 2^shift · target bound to a source limb.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KskRow {
    /// Source limb this row absorbs digits from.
    pub limb: usize,
    /// Digit position within the limb, in bits.
    pub shift_bits: u32,
    /// Mask component, NTT domain, full chain.
    pub a: RnsPoly,
    /// Body component, NTT domain, full chain.
    pub b: RnsPoly,
}

/// Key-switching key: all rows for one target polynomial.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeySwitchKey {
    pub rows: Vec<KskRow>,
}

/// Digits needed to cover modulus `q` in base 2^base_bits.
pub fn digit_count(q: u64, base_bits: u32) -> usize {
    let bits = 64 - q.leading_zeros();
    ((bits + base_bits - 1) / base_bits) as usize
}

impl KeySwitchKey {
    /// Generate rows encrypting `target_ntt` under `s_ntt`.
    ///
    /// Row (i, t) satisfies, in every limb j:
    ///   b_j = e_j - a_j ⊙ s_j + [j = i] · 2^(t·w) · target_j
    /// so folding digit t of source limb i against it contributes that
    /// limb's share of ĉ ⊙ target plus fresh noise.
    pub fn generate(
        target_ntt: &RnsPoly,
        s_ntt: &RnsPoly,
        params: &CkksParams,
        tables: &[NttTables],
        sampler: &mut NoiseSampler,
    ) -> Self {
        let moduli = &params.moduli;
        let n = params.ring_dim;
        let mut rows = Vec::new();
        for (i, &q_i) in moduli.iter().enumerate() {
            for t in 0..digit_count(q_i, params.gadget_base_bits) {
                let shift_bits = t as u32 * params.gadget_base_bits;
                let a = sampler.sample_uniform_rns(n, moduli);
                let mut b = sampler.sample_error_rns(n, moduli);
                forward_rns(&mut b, tables);
                let a_s = a.hadamard(s_ntt, moduli);
                b = b.sub(&a_s, moduli);
                let factor = (1u64 << shift_bits) % q_i;
                for (x, &tc) in b.limbs[i].iter_mut().zip(&target_ntt.limbs[i]) {
                    *x = mod_add(*x, mod_mul(factor, tc, q_i), q_i);
                }
                rows.push(KskRow {
                    limb: i,
                    shift_bits,
                    a,
                    b,
                });
            }
        }
        Self { rows }
    }

    /// Fold a coefficient-domain polynomial through the key.
    ///
    /// Returns `(body, mask)` in the NTT domain with the input's limb
    /// count; together they decrypt to ĉ ⊙ target plus switching noise.
    /// Rows for limbs the input no longer carries are skipped.
    pub fn apply(
        &self,
        poly: &RnsPoly,
        moduli: &[u64],
        tables: &[NttTables],
        base_bits: u32,
    ) -> (RnsPoly, RnsPoly) {
        debug_assert!(base_bits <= 32);
        let k = poly.limb_count();
        let n = poly.dimension();
        let active = &moduli[..k];
        let mask = (1u64 << base_bits) - 1;

        let mut body = RnsPoly::zero(k, n);
        let mut out_mask = RnsPoly::zero(k, n);
        for row in &self.rows {
            if row.limb >= k {
                continue;
            }
            let src = &poly.limbs[row.limb];
            let mut digit = RnsPoly::zero(k, n);
            for (limb, &q) in digit.limbs.iter_mut().zip(active) {
                for (d, &c) in limb.iter_mut().zip(src) {
                    *d = ((c >> row.shift_bits) & mask) % q;
                }
            }
            forward_rns(&mut digit, &tables[..k]);
            body.hadamard_accumulate(&digit, &row.b, active);
            out_mask.hadamard_accumulate(&digit, &row.a, active);
        }
        (body, out_mask)
    }
}
