//! Galois automorphisms X → X^g for slot rotation.
//!
//! With slots laid out along the orbit of 5 mod 2n, applying X → X^(5^r)
//! to the plaintext polynomial rotates the slot vector left by r. The
//! same map must be applied to ciphertext components (and, during key
//! generation, to the secret key) in the coefficient domain.

use crate::math::rns::{mod_add, mod_neg, RnsPoly};

/// Galois element for a left rotation by `step` slots: 5^step mod 2n.
pub fn rotation_element(step: usize, n: usize) -> usize {
    let m = 2 * n;
    let mut g = 1usize;
    for _ in 0..step {
        g = g * 5 % m;
    }
    g
}

/// Apply X → X^g to a coefficient-domain polynomial.
///
/// Coefficient i moves to index g·i mod 2n; indices at or above n wrap
/// around with a sign flip because X^n = -1.
pub fn apply_automorphism(poly: &RnsPoly, g: usize, moduli: &[u64]) -> RnsPoly {
    let n = poly.dimension();
    let m = 2 * n;
    let mut out = RnsPoly::zero(poly.limb_count(), n);
    for ((src, dst), &q) in poly.limbs.iter().zip(&mut out.limbs).zip(moduli) {
        for (i, &c) in src.iter().enumerate() {
            let new_idx = g * i % m;
            if new_idx < n {
                dst[new_idx] = mod_add(dst[new_idx], c, q);
            } else {
                dst[new_idx - n] = mod_add(dst[new_idx - n], mod_neg(c, q), q);
            }
        }
    }
    out
}

/// Apply X → X^g to a ternary polynomial in signed form.
pub fn apply_automorphism_ternary(coeffs: &[i8], g: usize) -> Vec<i8> {
    let n = coeffs.len();
    let m = 2 * n;
    let mut out = vec![0i8; n];
    for (i, &c) in coeffs.iter().enumerate() {
        let new_idx = g * i % m;
        if new_idx < n {
            out[new_idx] = c;
        } else {
            out[new_idx - n] = -c;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ckks::encoding::CkksEncoder;
    use crate::params::Q60;

    #[test]
    fn test_rotation_element_powers() {
        assert_eq!(rotation_element(0, 16), 1);
        assert_eq!(rotation_element(1, 16), 5);
        assert_eq!(rotation_element(2, 16), 25);
        // 5^3 = 125 = 32*3 + 29
        assert_eq!(rotation_element(3, 16), 29);
    }

    #[test]
    fn test_monomial_moves_with_sign() {
        let moduli = [97u64];
        // X^7 under X -> X^5: 35 mod 16 = 3 < 8, no sign flip.
        let x7 = RnsPoly::from_signed(&[0, 0, 0, 0, 0, 0, 0, 1], &moduli);
        let got = apply_automorphism(&x7, 5, &moduli);
        assert_eq!(got, RnsPoly::from_signed(&[0, 0, 0, 1, 0, 0, 0, 0], &moduli));

        // X^3 under X -> X^5: 15 >= 8, wraps to index 7 negated.
        let x3 = RnsPoly::from_signed(&[0, 0, 0, 1, 0, 0, 0, 0], &moduli);
        let got = apply_automorphism(&x3, 5, &moduli);
        assert_eq!(
            got,
            RnsPoly::from_signed(&[0, 0, 0, 0, 0, 0, 0, -1], &moduli)
        );
    }

    #[test]
    fn test_ternary_matches_rns_form() {
        let moduli = [97u64, 193];
        let s: Vec<i8> = vec![1, -1, 0, 1, 0, 0, -1, 1, 1, 0, -1, 0, 1, -1, 0, 0];
        let g = rotation_element(3, 16);
        let via_ternary = apply_automorphism_ternary(&s, g);
        let signed: Vec<i64> = s.iter().map(|&c| c as i64).collect();
        let via_rns = apply_automorphism(&RnsPoly::from_signed(&signed, &moduli), g, &moduli);
        let expected: Vec<i64> = via_ternary.iter().map(|&c| c as i64).collect();
        assert_eq!(via_rns, RnsPoly::from_signed(&expected, &moduli));
    }

    #[test]
    fn test_rotation_permutes_slots_left() {
        let n = 16;
        let scale = (1u64 << 30) as f64;
        let enc = CkksEncoder::new(n);
        let values = [4.0, -1.5, 2.25, 0.5, 3.0, -2.0, 1.0, 0.25];
        let poly = enc.encode(&values, scale, &[Q60]).unwrap();

        for step in [1usize, 2, 3] {
            let g = rotation_element(step, n);
            let rotated = apply_automorphism(&poly, g, &[Q60]);
            let decoded = enc.decode(&rotated, scale, Q60);
            for i in 0..8 {
                let want = values[(i + step) % 8];
                assert!(
                    (decoded[i] - want).abs() < 1e-6,
                    "step {} slot {}: {} vs {}",
                    step,
                    i,
                    decoded[i],
                    want
                );
            }
        }
    }

    #[test]
    fn test_identity_element_is_noop() {
        let moduli = [97u64];
        let p = RnsPoly::from_signed(&[3, -2, 5, 7, 0, 1, -1, 2], &moduli);
        assert_eq!(apply_automorphism(&p, 1, &moduli), p);
    }
}
