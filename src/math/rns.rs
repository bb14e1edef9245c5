//! Modular arithmetic over word-sized primes and RNS polynomials.
//!
//! A polynomial over the full coefficient modulus Q = q_0 * ... * q_L is
//! represented by its residues modulo each prime limb. All limb moduli are
//! NTT-friendly primes below 2^62, so products fit in u128.

use serde::{Deserialize, Serialize};

#[inline]
pub fn mod_add(a: u64, b: u64, q: u64) -> u64 {
    let s = a + b;
    if s >= q {
        s - q
    } else {
        s
    }
}

#[inline]
pub fn mod_sub(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        a + q - b
    }
}

#[inline]
pub fn mod_neg(a: u64, q: u64) -> u64 {
    if a == 0 {
        0
    } else {
        q - a
    }
}

#[inline]
pub fn mod_mul(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

/// Binary exponentiation mod q.
pub fn mod_pow(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut acc = 1u64;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mod_mul(acc, base, q);
        }
        base = mod_mul(base, base, q);
        exp >>= 1;
    }
    acc
}

/// Inverse mod a prime q via Fermat.
pub fn mod_inv(a: u64, q: u64) -> u64 {
    mod_pow(a, q - 2, q)
}

/// Reduce a signed value into [0, q).
#[inline]
pub fn reduce_i64(x: i64, q: u64) -> u64 {
    let r = x % q as i64;
    if r < 0 {
        (r + q as i64) as u64
    } else {
        r as u64
    }
}

/// Reduce a signed wide value into [0, q).
#[inline]
pub fn reduce_i128(x: i128, q: u64) -> u64 {
    let r = x % q as i128;
    if r < 0 {
        (r + q as i128) as u64
    } else {
        r as u64
    }
}

/// Lift a residue in [0, q) to its centered representative in (-q/2, q/2].
#[inline]
pub fn center(a: u64, q: u64) -> i128 {
    if a > q / 2 {
        a as i128 - q as i128
    } else {
        a as i128
    }
}

pub fn bit_reverse(x: usize, bits: u32) -> usize {
    x.reverse_bits() >> (usize::BITS - bits)
}

/// Find a primitive 2n-th root of unity mod q, if one exists.
///
/// q must be prime with q = 1 mod 2n. A candidate c = g^((q-1)/2n) always
/// satisfies c^(2n) = 1; it is primitive exactly when c^n = -1.
pub fn primitive_root_2n(two_n: u64, q: u64) -> Option<u64> {
    if (q - 1) % two_n != 0 {
        return None;
    }
    let cofactor = (q - 1) / two_n;
    for g in 2..2048u64 {
        let c = mod_pow(g, cofactor, q);
        if mod_pow(c, two_n / 2, q) == q - 1 {
            return Some(c);
        }
    }
    None
}

/// A polynomial of degree < n in RNS form: one residue vector per limb.
///
/// The limb moduli live in the parameter set, not here; operations take the
/// active modulus slice. Whether the coefficients are in the evaluation
/// (NTT) or coefficient domain is tracked by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RnsPoly {
    pub limbs: Vec<Vec<u64>>,
}

impl RnsPoly {
    pub fn zero(limb_count: usize, n: usize) -> Self {
        Self {
            limbs: vec![vec![0u64; n]; limb_count],
        }
    }

    /// Represent one small signed integer polynomial across every limb.
    pub fn from_signed(coeffs: &[i64], moduli: &[u64]) -> Self {
        let limbs = moduli
            .iter()
            .map(|&q| coeffs.iter().map(|&c| reduce_i64(c, q)).collect())
            .collect();
        Self { limbs }
    }

    pub fn limb_count(&self) -> usize {
        self.limbs.len()
    }

    pub fn dimension(&self) -> usize {
        self.limbs.first().map_or(0, Vec::len)
    }

    pub fn add(&self, other: &Self, moduli: &[u64]) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(&other.limbs)
            .zip(moduli)
            .map(|((a, b), &q)| {
                a.iter()
                    .zip(b)
                    .map(|(&x, &y)| mod_add(x, y, q))
                    .collect()
            })
            .collect();
        Self { limbs }
    }

    pub fn add_assign(&mut self, other: &Self, moduli: &[u64]) {
        for ((a, b), &q) in self.limbs.iter_mut().zip(&other.limbs).zip(moduli) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = mod_add(*x, y, q);
            }
        }
    }

    pub fn sub(&self, other: &Self, moduli: &[u64]) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(&other.limbs)
            .zip(moduli)
            .map(|((a, b), &q)| {
                a.iter()
                    .zip(b)
                    .map(|(&x, &y)| mod_sub(x, y, q))
                    .collect()
            })
            .collect();
        Self { limbs }
    }

    pub fn neg(&self, moduli: &[u64]) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(moduli)
            .map(|(a, &q)| a.iter().map(|&x| mod_neg(x, q)).collect())
            .collect();
        Self { limbs }
    }

    /// Pointwise product; both operands must be in the same domain.
    pub fn hadamard(&self, other: &Self, moduli: &[u64]) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(&other.limbs)
            .zip(moduli)
            .map(|((a, b), &q)| {
                a.iter()
                    .zip(b)
                    .map(|(&x, &y)| mod_mul(x, y, q))
                    .collect()
            })
            .collect();
        Self { limbs }
    }

    pub fn hadamard_accumulate(&mut self, a: &Self, b: &Self, moduli: &[u64]) {
        for (((acc, x), y), &q) in self
            .limbs
            .iter_mut()
            .zip(&a.limbs)
            .zip(&b.limbs)
            .zip(moduli)
        {
            for ((r, &u), &v) in acc.iter_mut().zip(x).zip(y) {
                *r = mod_add(*r, mod_mul(u, v, q), q);
            }
        }
    }

    /// Multiply every limb by the same scalar (reduced per limb).
    pub fn scalar_mul(&self, scalar: u64, moduli: &[u64]) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(moduli)
            .map(|(a, &q)| {
                let s = scalar % q;
                a.iter().map(|&x| mod_mul(x, s, q)).collect()
            })
            .collect();
        Self { limbs }
    }

    /// Restrict to the first `count` limbs.
    pub fn truncated(&self, count: usize) -> Self {
        Self {
            limbs: self.limbs[..count].to_vec(),
        }
    }

    pub fn drop_last_limb(&mut self) {
        self.limbs.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: u64 = 1099511480321;

    #[test]
    fn test_add_sub_wrap() {
        assert_eq!(mod_add(Q - 1, 5, Q), 4);
        assert_eq!(mod_sub(3, 5, Q), Q - 2);
        assert_eq!(mod_neg(0, Q), 0);
        assert_eq!(mod_neg(7, Q), Q - 7);
    }

    #[test]
    fn test_pow_and_inv() {
        for a in [2u64, 3, 12345, Q - 2] {
            let inv = mod_inv(a, Q);
            assert_eq!(mod_mul(a, inv, Q), 1, "a * a^-1 != 1 for a = {a}");
        }
        assert_eq!(mod_pow(2, 10, Q), 1024);
    }

    #[test]
    fn test_signed_reduction() {
        assert_eq!(reduce_i64(-1, Q), Q - 1);
        assert_eq!(reduce_i64(-(Q as i64) - 3, Q), Q - 3);
        assert_eq!(reduce_i128(-1, Q), Q - 1);
        assert_eq!(center(Q - 1, Q), -1);
        assert_eq!(center(1, Q), 1);
    }

    #[test]
    fn test_primitive_root_has_exact_order() {
        let two_n = 1024u64;
        let root = primitive_root_2n(two_n, Q).unwrap();
        assert_eq!(mod_pow(root, two_n, Q), 1);
        assert_eq!(mod_pow(root, two_n / 2, Q), Q - 1);
    }

    #[test]
    fn test_bit_reverse_small() {
        assert_eq!(bit_reverse(0b001, 3), 0b100);
        assert_eq!(bit_reverse(0b110, 3), 0b011);
        assert_eq!(bit_reverse(5, 4), 10);
    }

    #[test]
    fn test_rns_poly_ops() {
        let moduli = [17u64, 97];
        let a = RnsPoly::from_signed(&[1, -1, 3, 0], &moduli);
        let b = RnsPoly::from_signed(&[2, 5, -3, 1], &moduli);
        let sum = a.add(&b, &moduli);
        assert_eq!(sum, RnsPoly::from_signed(&[3, 4, 0, 1], &moduli));
        let diff = a.sub(&b, &moduli);
        assert_eq!(diff, RnsPoly::from_signed(&[-1, -6, 6, -1], &moduli));
        let prod = a.hadamard(&b, &moduli);
        assert_eq!(prod, RnsPoly::from_signed(&[2, -5, -9, 0], &moduli));
        assert_eq!(a.neg(&moduli), RnsPoly::from_signed(&[-1, 1, -3, 0], &moduli));
    }

    #[test]
    fn test_truncate_and_drop() {
        let moduli = [17u64, 97, 193];
        let mut p = RnsPoly::from_signed(&[4, 5], &moduli);
        assert_eq!(p.limb_count(), 3);
        let t = p.truncated(2);
        assert_eq!(t.limb_count(), 2);
        p.drop_last_limb();
        assert_eq!(p, t);
    }
}
