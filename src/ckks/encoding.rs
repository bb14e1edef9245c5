//! Canonical-embedding encoder for packed real vectors.
//!
//! A vector of up to n/2 reals is placed in the complex evaluation points
//! of the ring indexed by the orbit of 5 modulo 2n, scaled by Δ, and
//! rounded to an integer polynomial. Evaluating the polynomial back at
//! those points recovers the vector, so slotwise products of encodings
//! correspond to negacyclic products of the polynomials.
//!
//! The orbit ordering matters: a rotation of the slot vector is then
//! exactly the automorphism X → X^(5^r), which is what makes rotation
//! keys work. The transform is the standard special FFT over the half
//! orbit, kept here as split re/im arrays.

use crate::error::{Error, Result};
use crate::math::rns::{center, reduce_i128, RnsPoly};

/// Precomputed transform tables for one ring dimension.
#[derive(Clone, Debug)]
pub struct CkksEncoder {
    n: usize,
    slots: usize,
    /// Cyclotomic order m = 2n.
    m: usize,
    /// Orbit of 5 mod m: rot_group[j] = 5^j mod m.
    rot_group: Vec<usize>,
    /// ksi[k] = exp(2πik/m), split into re/im, with index m aliased to 0.
    ksi_re: Vec<f64>,
    ksi_im: Vec<f64>,
}

impl CkksEncoder {
    /// Build tables for ring dimension `n` (power of two, at least 8).
    pub fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two() && n >= 8);
        let slots = n / 2;
        let m = 2 * n;
        let mut rot_group = Vec::with_capacity(slots);
        let mut five = 1usize;
        for _ in 0..slots {
            rot_group.push(five);
            five = five * 5 % m;
        }
        let mut ksi_re = Vec::with_capacity(m + 1);
        let mut ksi_im = Vec::with_capacity(m + 1);
        for k in 0..=m {
            let angle = 2.0 * std::f64::consts::PI * (k % m) as f64 / m as f64;
            ksi_re.push(angle.cos());
            ksi_im.push(angle.sin());
        }
        Self {
            n,
            slots,
            m,
            rot_group,
            ksi_re,
            ksi_im,
        }
    }

    /// Number of available slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Encode a real vector into an RNS polynomial at the given scale.
    ///
    /// Shorter vectors are zero-padded to the slot count. Fails with
    /// [`Error::CapacityExceeded`] when the vector is too long and
    /// [`Error::MalformedInput`] when any entry is non-finite.
    pub fn encode(&self, values: &[f64], scale: f64, moduli: &[u64]) -> Result<RnsPoly> {
        if values.len() > self.slots {
            return Err(Error::CapacityExceeded {
                len: values.len(),
                capacity: self.slots,
            });
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::MalformedInput(format!(
                "cannot encode non-finite value {bad}"
            )));
        }
        let mut re = vec![0.0f64; self.slots];
        let mut im = vec![0.0f64; self.slots];
        re[..values.len()].copy_from_slice(values);
        self.special_ifft(&mut re, &mut im);

        let mut ints = vec![0i128; self.n];
        for i in 0..self.slots {
            ints[i] = (re[i] * scale).round() as i128;
            ints[i + self.slots] = (im[i] * scale).round() as i128;
        }
        let limbs = moduli
            .iter()
            .map(|&q| ints.iter().map(|&c| reduce_i128(c, q)).collect())
            .collect();
        Ok(RnsPoly { limbs })
    }

    /// Encode the same constant into every slot.
    ///
    /// A constant vector embeds as the constant polynomial, so only the
    /// degree-zero coefficient is populated.
    pub fn encode_constant(&self, value: f64, scale: f64, moduli: &[u64]) -> Result<RnsPoly> {
        if !value.is_finite() {
            return Err(Error::MalformedInput(format!(
                "cannot encode non-finite value {value}"
            )));
        }
        let c = (value * scale).round() as i128;
        let mut poly = RnsPoly::zero(moduli.len(), self.n);
        for (limb, &q) in poly.limbs.iter_mut().zip(moduli) {
            limb[0] = reduce_i128(c, q);
        }
        Ok(poly)
    }

    /// Decode the first limb of a coefficient-domain polynomial.
    ///
    /// Centered reduction modulo the base prime is exact whenever the
    /// underlying message is small relative to it, which decryption
    /// guarantees at every level.
    pub fn decode(&self, poly: &RnsPoly, scale: f64, q0: u64) -> Vec<f64> {
        let limb = &poly.limbs[0];
        let mut re = vec![0.0f64; self.slots];
        let mut im = vec![0.0f64; self.slots];
        for i in 0..self.slots {
            re[i] = center(limb[i], q0) as f64 / scale;
            im[i] = center(limb[i + self.slots], q0) as f64 / scale;
        }
        self.special_fft(&mut re, &mut im);
        re
    }

    /// Inverse embedding: slot values to (unscaled) polynomial halves.
    fn special_ifft(&self, re: &mut [f64], im: &mut [f64]) {
        let slots = self.slots;
        let mut len = slots;
        while len >= 2 {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = self.m / lenq;
            let mut i = 0;
            while i < slots {
                for j in 0..lenh {
                    let r = self.rot_group[j] % lenq;
                    let idx = (lenq - r) * gap;
                    let (ur, ui) = (re[i + j] + re[i + j + lenh], im[i + j] + im[i + j + lenh]);
                    let (dr, di) = (re[i + j] - re[i + j + lenh], im[i + j] - im[i + j + lenh]);
                    re[i + j] = ur;
                    im[i + j] = ui;
                    re[i + j + lenh] = dr * self.ksi_re[idx] - di * self.ksi_im[idx];
                    im[i + j + lenh] = dr * self.ksi_im[idx] + di * self.ksi_re[idx];
                }
                i += len;
            }
            len >>= 1;
        }
        bit_reverse_pairs(re, im);
        let inv = 1.0 / slots as f64;
        for x in re.iter_mut() {
            *x *= inv;
        }
        for x in im.iter_mut() {
            *x *= inv;
        }
    }

    /// Forward embedding: polynomial halves to slot values.
    fn special_fft(&self, re: &mut [f64], im: &mut [f64]) {
        let slots = self.slots;
        bit_reverse_pairs(re, im);
        let mut len = 2;
        while len <= slots {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = self.m / lenq;
            let mut i = 0;
            while i < slots {
                for j in 0..lenh {
                    let idx = (self.rot_group[j] % lenq) * gap;
                    let (vr, vi) = (
                        re[i + j + lenh] * self.ksi_re[idx] - im[i + j + lenh] * self.ksi_im[idx],
                        re[i + j + lenh] * self.ksi_im[idx] + im[i + j + lenh] * self.ksi_re[idx],
                    );
                    let (ur, ui) = (re[i + j], im[i + j]);
                    re[i + j] = ur + vr;
                    im[i + j] = ui + vi;
                    re[i + j + lenh] = ur - vr;
                    im[i + j + lenh] = ui - vi;
                }
                i += len;
            }
            len <<= 1;
        }
    }
}

fn bit_reverse_pairs(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = crate::math::rns::bit_reverse(i, bits);
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ntt::NttTables;
    use crate::params::Q60;

    const SCALE: f64 = (1u64 << 30) as f64;

    #[test]
    fn test_encode_decode_roundtrip() {
        let enc = CkksEncoder::new(64);
        let moduli = [Q60];
        let values: Vec<f64> = (0..32).map(|i| (i as f64 - 16.0) * 0.37).collect();
        let poly = enc.encode(&values, SCALE, &moduli).unwrap();
        let decoded = enc.decode(&poly, SCALE, Q60);
        for (got, want) in decoded.iter().zip(&values) {
            assert!(
                (got - want).abs() < 1e-6,
                "decoded {} expected {}",
                got,
                want
            );
        }
    }

    #[test]
    fn test_short_vector_pads_with_zeros() {
        let enc = CkksEncoder::new(64);
        let poly = enc.encode(&[1.5, -2.5], SCALE, &[Q60]).unwrap();
        let decoded = enc.decode(&poly, SCALE, Q60);
        assert!((decoded[0] - 1.5).abs() < 1e-6);
        assert!((decoded[1] + 2.5).abs() < 1e-6);
        for &v in &decoded[2..] {
            assert!(v.abs() < 1e-6);
        }
    }

    #[test]
    fn test_constant_matches_full_encode() {
        let enc = CkksEncoder::new(32);
        let fast = enc.encode_constant(0.731, SCALE, &[Q60]).unwrap();
        let slow = enc.encode(&vec![0.731; 16], SCALE, &[Q60]).unwrap();
        let df = enc.decode(&fast, SCALE, Q60);
        let ds = enc.decode(&slow, SCALE, Q60);
        for (a, b) in df.iter().zip(&ds) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_capacity_error() {
        let enc = CkksEncoder::new(32);
        let err = enc.encode(&[0.0; 17], SCALE, &[Q60]).unwrap_err();
        match err {
            Error::CapacityExceeded { len, capacity } => {
                assert_eq!(len, 17);
                assert_eq!(capacity, 16);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_rejects_non_finite() {
        let enc = CkksEncoder::new(32);
        assert!(matches!(
            enc.encode(&[1.0, f64::NAN], SCALE, &[Q60]),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            enc.encode_constant(f64::INFINITY, SCALE, &[Q60]),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_polynomial_product_is_slotwise() {
        // The whole scheme rests on this: negacyclic multiplication of
        // encodings multiplies the slot vectors elementwise. The scale is
        // kept small so the squared scale stays clear of the modulus.
        let n = 16;
        let scale = (1u64 << 25) as f64;
        let enc = CkksEncoder::new(n);
        let tables = NttTables::new(n, Q60).unwrap();
        let a = [1.5, -0.25, 3.0, 0.5, -1.0, 2.0, 0.0, 1.25];
        let b = [2.0, 4.0, -0.5, 1.5, 0.75, -1.25, 3.5, 0.5];
        let pa = enc.encode(&a, scale, &[Q60]).unwrap();
        let pb = enc.encode(&b, scale, &[Q60]).unwrap();
        let prod = tables.negacyclic_mul(&pa.limbs[0], &pb.limbs[0]);
        let prod_poly = RnsPoly {
            limbs: vec![prod],
        };
        let decoded = enc.decode(&prod_poly, scale * scale, Q60);
        for i in 0..8 {
            assert!(
                (decoded[i] - a[i] * b[i]).abs() < 1e-4,
                "slot {}: {} vs {}",
                i,
                decoded[i],
                a[i] * b[i]
            );
        }
    }
}
