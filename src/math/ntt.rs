//! Number-Theoretic Transform (NTT) for fast polynomial multiplication.
//!
//! Implements Cooley-Tukey radix-2 NTT for negacyclic convolution over
//! R_q = Z_q[X]/(X^n + 1). The NTT enables O(n log n) polynomial
//! multiplication instead of O(n²) naive multiplication.
//!
//! # Theory
//!
//! For negacyclic convolution (multiplication modulo X^n + 1), we use a
//! primitive 2n-th root of unity ψ where ψ^n = -1. Twiddle factors are
//! stored in bit-reversed order so butterflies read them with unit stride;
//! the forward transform maps standard coefficient order to bit-reversed
//! evaluation order and the inverse undoes it, so callers never observe
//! the permutation.
//!
//! # Requirements
//!
//! Each modulus q must satisfy q ≡ 1 (mod 2n) for a primitive 2n-th root
//! of unity to exist. Every prime in [`crate::params::CkksParams`] meets
//! this for the supported ring degrees.
//!
//! # Example
//!
//! ```
//! use cloakscore::math::ntt::NttTables;
//!
//! let tables = NttTables::new(256, 1099511480321).unwrap();
//!
//! let mut coeffs = vec![1u64; 256];
//! tables.forward(&mut coeffs);
//! tables.inverse(&mut coeffs);
//! assert_eq!(coeffs[0], 1);
//! ```

use serde::{Deserialize, Serialize};

use super::rns::{
    bit_reverse, mod_add, mod_inv, mod_mul, mod_sub, primitive_root_2n, RnsPoly,
};

/// Precomputed NTT tables for one prime limb.
///
/// Stores forward and inverse twiddle factors for a fixed ring dimension
/// and modulus. Create once per limb and reuse for every transform; the
/// tables are immutable and safe to share across threads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NttTables {
    /// Modulus for this limb.
    pub q: u64,
    /// Ring dimension (power of two).
    pub n: usize,
    /// Powers of ψ in bit-reversed order.
    psi_rev: Vec<u64>,
    /// Powers of ψ^(-1) in bit-reversed order.
    inv_psi_rev: Vec<u64>,
    /// n^(-1) mod q for inverse NTT scaling.
    n_inv: u64,
}

impl NttTables {
    /// Creates NTT tables for the given ring dimension and modulus.
    ///
    /// # Arguments
    ///
    /// * `n` - Ring dimension (must be a power of two, at least 2)
    /// * `q` - Prime modulus satisfying q ≡ 1 (mod 2n)
    ///
    /// # Returns
    ///
    /// `None` when `n` is not a power of two or `q` admits no primitive
    /// 2n-th root of unity.
    pub fn new(n: usize, q: u64) -> Option<Self> {
        if !n.is_power_of_two() || n < 2 {
            return None;
        }
        let psi = primitive_root_2n(2 * n as u64, q)?;
        let psi_inv = mod_inv(psi, q);
        let bits = n.trailing_zeros();

        let mut powers = vec![0u64; n];
        let mut inv_powers = vec![0u64; n];
        let mut p = 1u64;
        let mut pi = 1u64;
        for i in 0..n {
            powers[i] = p;
            inv_powers[i] = pi;
            p = mod_mul(p, psi, q);
            pi = mod_mul(pi, psi_inv, q);
        }

        let mut psi_rev = vec![0u64; n];
        let mut inv_psi_rev = vec![0u64; n];
        for i in 0..n {
            let r = bit_reverse(i, bits);
            psi_rev[i] = powers[r];
            inv_psi_rev[i] = inv_powers[r];
        }

        Some(Self {
            q,
            n,
            psi_rev,
            inv_psi_rev,
            n_inv: mod_inv(n as u64, q),
        })
    }

    /// Performs forward NTT in-place using Cooley-Tukey decimation-in-time.
    ///
    /// Converts polynomial coefficients to the evaluation domain
    /// (evaluations at odd powers of ψ, bit-reversed order).
    ///
    /// # Arguments
    ///
    /// * `a` - Polynomial coefficients (modified in-place, length n)
    pub fn forward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.n);
        let q = self.q;
        let mut t = self.n;
        let mut m = 1;
        while m < self.n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let w = self.psi_rev[m + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = mod_mul(a[j + t], w, q);
                    a[j] = mod_add(u, v, q);
                    a[j + t] = mod_sub(u, v, q);
                }
            }
            m <<= 1;
        }
    }

    /// Performs inverse NTT in-place using Gentleman-Sande decimation-in-frequency.
    ///
    /// Converts the evaluation domain back to standard coefficient order,
    /// including the final scaling by n^(-1).
    ///
    /// # Arguments
    ///
    /// * `a` - Evaluation-domain values (modified in-place, length n)
    pub fn inverse(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.n);
        let q = self.q;
        let mut t = 1;
        let mut m = self.n;
        while m > 1 {
            let h = m >> 1;
            let mut j1 = 0;
            for i in 0..h {
                let w = self.inv_psi_rev[h + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = a[j + t];
                    a[j] = mod_add(u, v, q);
                    a[j + t] = mod_mul(mod_sub(u, v, q), w, q);
                }
                j1 += 2 * t;
            }
            t <<= 1;
            m = h;
        }
        for x in a.iter_mut() {
            *x = mod_mul(*x, self.n_inv, q);
        }
    }

    /// Negacyclic product of two coefficient-order polynomials.
    ///
    /// Convenience wrapper: forward both operands, multiply pointwise,
    /// inverse the result.
    pub fn negacyclic_mul(&self, a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut fa = a.to_vec();
        let mut fb = b.to_vec();
        self.forward(&mut fa);
        self.forward(&mut fb);
        for (x, &y) in fa.iter_mut().zip(&fb) {
            *x = mod_mul(*x, y, self.q);
        }
        self.inverse(&mut fa);
        fa
    }
}

/// Forward-transforms every limb of an RNS polynomial.
///
/// The polynomial may hold fewer limbs than `tables` after rescaling;
/// only the limbs present are transformed.
pub fn forward_rns(poly: &mut RnsPoly, tables: &[NttTables]) {
    for (limb, t) in poly.limbs.iter_mut().zip(tables) {
        t.forward(limb);
    }
}

/// Inverse-transforms every limb of an RNS polynomial.
pub fn inverse_rns(poly: &mut RnsPoly, tables: &[NttTables]) {
    for (limb, t) in poly.limbs.iter_mut().zip(tables) {
        t.inverse(limb);
    }
}
