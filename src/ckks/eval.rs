//! Homomorphic operations and the scoring circuit.
//!
//! All binary operations require operands under the same parameter
//! fingerprint and at the same level; additions also require matching
//! scales. Multiplications consume a level through [`PublicContext::rescale`],
//! so a fresh ciphertext over the production chain supports exactly the
//! three levels the cubic sigmoid circuit needs.

use crate::ckks::ciphertext::Ciphertext;
use crate::ckks::galois::{apply_automorphism, rotation_element};
use crate::error::{Error, Result};
use crate::math::ntt::{forward_rns, inverse_rns};
use crate::math::rns::{center, mod_add, mod_inv, mod_mul, mod_sub, reduce_i128, RnsPoly};
use crate::model::LinearModel;

use super::context::PublicContext;

/// Cubic logistic approximation: f(x) = 0.5 + 0.197x - 0.004x³.
///
/// Tracks the logistic function to within ~0.03 on [-5, 5] and saturates
/// (then diverges) outside it; scores are clamped after decryption.
pub const SIGMOID_C0: f64 = 0.5;
pub const SIGMOID_C1: f64 = 0.197;
pub const SIGMOID_C3: f64 = -0.004;

/// Levels the scoring circuit consumes.
pub const CIRCUIT_DEPTH: usize = 3;

/// Plaintext reference for the homomorphic circuit.
pub fn sigmoid_approx(x: f64) -> f64 {
    SIGMOID_C0 + SIGMOID_C1 * x + SIGMOID_C3 * x * x * x
}

/// Plaintext reference for a full model evaluation.
pub fn plain_score(model: &LinearModel, features: &[f64]) -> f64 {
    sigmoid_approx(model.affine(features))
}

impl PublicContext {
    /// Cheap per-operation check; full structural validation belongs at
    /// the ingress boundary.
    fn check(&self, ct: &Ciphertext) -> Result<usize> {
        if ct.fingerprint != self.fingerprint {
            return Err(Error::WrongContext(format!(
                "ciphertext fingerprint {:016x} does not match context {:016x}",
                ct.fingerprint, self.fingerprint
            )));
        }
        let k = ct.limb_count();
        if k == 0 || k > self.params.moduli.len() {
            return Err(Error::MalformedInput(format!(
                "ciphertext carries {} limbs, parameters allow 1..={}",
                k,
                self.params.moduli.len()
            )));
        }
        Ok(k)
    }

    fn check_pair(&self, x: &Ciphertext, y: &Ciphertext) -> Result<usize> {
        let kx = self.check(x)?;
        let ky = self.check(y)?;
        if kx != ky {
            return Err(Error::MalformedInput(format!(
                "operands at different levels: {} vs {} limbs",
                kx, ky
            )));
        }
        Ok(kx)
    }

    /// Slotwise sum. Operands must share level and scale.
    pub fn add(&self, x: &Ciphertext, y: &Ciphertext) -> Result<Ciphertext> {
        let k = self.check_pair(x, y)?;
        if !scales_match(x.scale, y.scale) {
            return Err(Error::MalformedInput(format!(
                "scale mismatch in addition: {} vs {}",
                x.scale, y.scale
            )));
        }
        let moduli = &self.params.moduli[..k];
        Ok(Ciphertext {
            c0: x.c0.add(&y.c0, moduli),
            c1: x.c1.add(&y.c1, moduli),
            scale: x.scale,
            fingerprint: x.fingerprint,
        })
    }

    /// Add the same constant to every slot, encoded at the operand's scale.
    pub fn add_plain_constant(&self, x: &Ciphertext, value: f64) -> Result<Ciphertext> {
        let k = self.check(x)?;
        if !value.is_finite() {
            return Err(Error::MalformedInput(format!(
                "cannot encode non-finite value {value}"
            )));
        }
        // A constant polynomial evaluates to its constant everywhere, so
        // its NTT form is that constant in every position.
        let c = (value * x.scale).round() as i128;
        let mut out = x.clone();
        for (limb, &q) in out.c0.limbs.iter_mut().zip(&self.params.moduli[..k]) {
            let r = reduce_i128(c, q);
            for coeff in limb.iter_mut() {
                *coeff = mod_add(*coeff, r, q);
            }
        }
        Ok(out)
    }

    /// Slotwise product with a plaintext vector encoded at `pt_scale`.
    ///
    /// The result's scale is the product of scales; follow with
    /// [`PublicContext::rescale`] to bring it back down.
    pub fn mul_plain_vector(
        &self,
        x: &Ciphertext,
        values: &[f64],
        pt_scale: f64,
    ) -> Result<Ciphertext> {
        let k = self.check(x)?;
        let rt = self.runtime()?;
        let moduli = &self.params.moduli[..k];
        let mut pt = rt.encoder.encode(values, pt_scale, moduli)?;
        forward_rns(&mut pt, &rt.tables[..k]);
        Ok(Ciphertext {
            c0: x.c0.hadamard(&pt, moduli),
            c1: x.c1.hadamard(&pt, moduli),
            scale: x.scale * pt_scale,
            fingerprint: x.fingerprint,
        })
    }

    /// Slotwise product with the same constant in every slot.
    pub fn mul_plain_constant(
        &self,
        x: &Ciphertext,
        value: f64,
        pt_scale: f64,
    ) -> Result<Ciphertext> {
        let k = self.check(x)?;
        if !value.is_finite() || !pt_scale.is_finite() || pt_scale <= 0.0 {
            return Err(Error::MalformedInput(format!(
                "cannot encode constant {value} at scale {pt_scale}"
            )));
        }
        let c = (value * pt_scale).round() as i128;
        let moduli = &self.params.moduli[..k];
        let mut out = x.clone();
        for part in [&mut out.c0, &mut out.c1] {
            for (limb, &q) in part.limbs.iter_mut().zip(moduli) {
                let r = reduce_i128(c, q);
                for coeff in limb.iter_mut() {
                    *coeff = mod_mul(*coeff, r, q);
                }
            }
        }
        out.scale = x.scale * pt_scale;
        Ok(out)
    }

    /// Ciphertext-ciphertext product with relinearization.
    ///
    /// The quadratic term is folded back to a two-component ciphertext
    /// through the relinearization key; the usual rescale afterwards is
    /// left to the caller.
    pub fn mul_ct(&self, x: &Ciphertext, y: &Ciphertext) -> Result<Ciphertext> {
        let k = self.check_pair(x, y)?;
        let rt = self.runtime()?;
        let moduli = &self.params.moduli[..k];

        let d0 = x.c0.hadamard(&y.c0, moduli);
        let mut d1 = x.c0.hadamard(&y.c1, moduli);
        d1.add_assign(&x.c1.hadamard(&y.c0, moduli), moduli);
        let mut d2 = x.c1.hadamard(&y.c1, moduli);

        inverse_rns(&mut d2, &rt.tables[..k]);
        let (body, mask) =
            self.eval
                .relin
                .apply(&d2, &self.params.moduli, &rt.tables, self.params.gadget_base_bits);

        Ok(Ciphertext {
            c0: d0.add(&body, moduli),
            c1: d1.add(&mask, moduli),
            scale: x.scale * y.scale,
            fingerprint: x.fingerprint,
        })
    }

    /// Divide out the last chain prime, dropping one level.
    ///
    /// Fails with [`Error::NoiseBudgetExhausted`] on a last-level
    /// ciphertext: the base prime can never be dropped.
    pub fn rescale(&self, x: &Ciphertext) -> Result<Ciphertext> {
        let k = self.check(x)?;
        if k == 1 {
            return Err(Error::NoiseBudgetExhausted {
                required: 1,
                available: 0,
            });
        }
        let rt = self.runtime()?;
        let moduli = &self.params.moduli[..k];
        let q_last = moduli[k - 1];

        let mut c0 = x.c0.clone();
        let mut c1 = x.c1.clone();
        inverse_rns(&mut c0, &rt.tables[..k]);
        inverse_rns(&mut c1, &rt.tables[..k]);
        for part in [&mut c0, &mut c1] {
            rescale_coeff_domain(part, moduli);
        }
        forward_rns(&mut c0, &rt.tables[..k - 1]);
        forward_rns(&mut c1, &rt.tables[..k - 1]);

        Ok(Ciphertext {
            c0,
            c1,
            scale: x.scale / q_last as f64,
            fingerprint: x.fingerprint,
        })
    }

    /// Drop the last limb without dividing, keeping the scale.
    ///
    /// Used to bring a ciphertext down to an operand's level when no
    /// scale correction is wanted.
    pub fn mod_drop(&self, x: &Ciphertext) -> Result<Ciphertext> {
        let k = self.check(x)?;
        if k == 1 {
            return Err(Error::NoiseBudgetExhausted {
                required: 1,
                available: 0,
            });
        }
        let mut out = x.clone();
        out.c0.drop_last_limb();
        out.c1.drop_last_limb();
        Ok(out)
    }

    /// Rotate the slot vector left by `step` positions.
    ///
    /// Requires a rotation key for exactly this step; keys exist for every
    /// power of two below the slot count. A missing key is a
    /// [`Error::ContextMismatch`], not a malformed input: the ciphertext
    /// is fine, the context cannot serve it.
    pub fn rotate(&self, x: &Ciphertext, step: usize) -> Result<Ciphertext> {
        let k = self.check(x)?;
        let step = step % self.params.slots();
        if step == 0 {
            return Ok(x.clone());
        }
        let key = self
            .eval
            .rotations
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, key)| key)
            .ok_or_else(|| {
                Error::ContextMismatch(format!("no rotation key for step {step}"))
            })?;
        let rt = self.runtime()?;
        let moduli = &self.params.moduli[..k];
        let g = rotation_element(step, self.params.ring_dim);

        let mut c0 = x.c0.clone();
        let mut c1 = x.c1.clone();
        inverse_rns(&mut c0, &rt.tables[..k]);
        inverse_rns(&mut c1, &rt.tables[..k]);
        let mut rot0 = apply_automorphism(&c0, g, moduli);
        let rot1 = apply_automorphism(&c1, g, moduli);

        let (body, mask) =
            key.apply(&rot1, &self.params.moduli, &rt.tables, self.params.gadget_base_bits);
        forward_rns(&mut rot0, &rt.tables[..k]);

        Ok(Ciphertext {
            c0: rot0.add(&body, moduli),
            c1: mask,
            scale: x.scale,
            fingerprint: x.fingerprint,
        })
    }

    /// Fold the first `len` slots into slot zero by rotate-and-add.
    ///
    /// Slots past `len` must be zero (encryption zero-pads, so they are);
    /// folding then only needs the power-of-two rotations below the padded
    /// width.
    pub fn sum_slots(&self, x: &Ciphertext, len: usize) -> Result<Ciphertext> {
        self.check(x)?;
        if len > self.params.slots() {
            return Err(Error::CapacityExceeded {
                len,
                capacity: self.params.slots(),
            });
        }
        let width = len.next_power_of_two();
        let mut acc = x.clone();
        let mut step = 1;
        while step < width {
            let rotated = self.rotate(&acc, step)?;
            acc = self.add(&acc, &rotated)?;
            step <<= 1;
        }
        Ok(acc)
    }

    /// Run the full scoring circuit on an encrypted feature vector.
    ///
    /// Computes f(w·x + b) with f the cubic logistic approximation,
    /// consuming all three levels. The score lands in slot zero of the
    /// result. Fails up front with [`Error::NoiseBudgetExhausted`] when
    /// the ciphertext does not carry enough levels.
    pub fn evaluate_model(&self, ct: &Ciphertext, model: &LinearModel) -> Result<Ciphertext> {
        let available = ct.level();
        if available < CIRCUIT_DEPTH {
            return Err(Error::NoiseBudgetExhausted {
                required: CIRCUIT_DEPTH,
                available,
            });
        }
        ct.validate_for(&self.params)?;
        let delta = self.params.scale();

        // Dot product: slotwise weights, fold, shift by the intercept.
        let prod = self.mul_plain_vector(ct, &model.coefficients, delta)?;
        let prod = self.rescale(&prod)?;
        let summed = self.sum_slots(&prod, model.coefficients.len())?;
        let x = self.add_plain_constant(&summed, model.intercept)?;

        // x² and the cubic term's linear factor, one level down.
        let x2 = self.rescale(&self.mul_ct(&x, &x)?)?;
        let y = self.rescale(&self.mul_plain_constant(&x, SIGMOID_C3, delta)?)?;

        // z = -0.004 x³, two levels down.
        let z = self.rescale(&self.mul_ct(&x2, &y)?)?;

        // Linear term, brought to z's level and exactly z's scale.
        let xd = self.mod_drop(&x)?;
        let q_div = self.params.moduli[xd.limb_count() - 1] as f64;
        let pt_scale = z.scale * q_div / xd.scale;
        let w = self.rescale(&self.mul_plain_constant(&xd, SIGMOID_C1, pt_scale)?)?;

        let poly = self.add(&z, &w)?;
        self.add_plain_constant(&poly, SIGMOID_C0)
    }
}

fn scales_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= a.abs().max(b.abs()) * 1e-9
}

/// Exact RNS rescale of a coefficient-domain polynomial: subtract the
/// centered last limb, then multiply by its inverse in each survivor.
fn rescale_coeff_domain(poly: &mut RnsPoly, moduli: &[u64]) {
    let k = poly.limb_count();
    let q_last = moduli[k - 1];
    let last = poly.limbs[k - 1].clone();
    for j in 0..k - 1 {
        let q = moduli[j];
        let q_last_inv = mod_inv(q_last % q, q);
        for (c, &l) in poly.limbs[j].iter_mut().zip(&last) {
            let lifted = reduce_i128(center(l, q_last), q);
            *c = mod_mul(mod_sub(*c, lifted, q), q_last_inv, q);
        }
    }
    poly.drop_last_limb();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ckks::context::PrivateContext;
    use crate::math::sampler::NoiseSampler;
    use crate::params::{CkksParams, Q40A, Q40B, Q40C, Q60};

    fn test_params() -> CkksParams {
        CkksParams::custom(64, vec![Q60, Q40A, Q40B, Q40C], 40)
    }

    fn setup(seed: u64) -> (PrivateContext, PublicContext, NoiseSampler) {
        let mut sampler = NoiseSampler::with_seed(3.2, seed);
        let private = PrivateContext::generate(test_params(), &mut sampler).unwrap();
        let public = private.derive_public();
        (private, public, sampler)
    }

    #[test]
    fn test_add_slotwise() {
        let (private, public, mut sampler) = setup(21);
        let a = private.encrypt_vector(&[1.0, 2.0, 3.0], &mut sampler).unwrap();
        let b = private.encrypt_vector(&[0.5, -1.0, 4.0], &mut sampler).unwrap();
        let sum = public.add(&a, &b).unwrap();
        let got = private.decrypt_vector(&sum).unwrap();
        for (g, w) in got.iter().zip([1.5, 1.0, 7.0]) {
            assert!((g - w).abs() < 1e-5, "{} vs {}", g, w);
        }
    }

    #[test]
    fn test_add_rejects_scale_mismatch() {
        let (private, public, mut sampler) = setup(22);
        let a = private.encrypt_vector(&[1.0], &mut sampler).unwrap();
        let mut b = private.encrypt_vector(&[1.0], &mut sampler).unwrap();
        b.scale *= 2.0;
        assert!(matches!(
            public.add(&a, &b),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_mul_plain_vector_rescales() {
        let (private, public, mut sampler) = setup(23);
        let ct = private
            .encrypt_vector(&[2.0, -1.5, 0.25], &mut sampler)
            .unwrap();
        let prod = public
            .mul_plain_vector(&ct, &[0.5, 2.0, 4.0], public.params().scale())
            .unwrap();
        let prod = public.rescale(&prod).unwrap();
        assert_eq!(prod.level(), 2);
        let got = private.decrypt_vector(&prod).unwrap();
        for (g, w) in got.iter().zip([1.0, -3.0, 1.0]) {
            assert!((g - w).abs() < 1e-4, "{} vs {}", g, w);
        }
    }

    #[test]
    fn test_mul_ct_with_relin() {
        let (private, public, mut sampler) = setup(24);
        let a = private.encrypt_vector(&[1.5, -2.0, 0.5], &mut sampler).unwrap();
        let b = private.encrypt_vector(&[2.0, 3.0, -4.0], &mut sampler).unwrap();
        let prod = public.rescale(&public.mul_ct(&a, &b).unwrap()).unwrap();
        let got = private.decrypt_vector(&prod).unwrap();
        for (g, w) in got.iter().zip([3.0, -6.0, -2.0]) {
            assert!((g - w).abs() < 1e-3, "{} vs {}", g, w);
        }
    }

    #[test]
    fn test_rotate_shifts_left() {
        let (private, public, mut sampler) = setup(25);
        let values = [1.0, 2.0, 3.0, 4.0];
        let ct = private.encrypt_vector(&values, &mut sampler).unwrap();
        let rot = public.rotate(&ct, 2).unwrap();
        let got = private.decrypt_vector(&rot).unwrap();
        // Slots 2 and 3 move to 0 and 1; the zero padding rotates in after.
        assert!((got[0] - 3.0).abs() < 1e-3);
        assert!((got[1] - 4.0).abs() < 1e-3);
        assert!(got[2].abs() < 1e-3);
    }

    #[test]
    fn test_rotate_without_key_is_context_mismatch() {
        let (private, public, mut sampler) = setup(26);
        let ct = private.encrypt_vector(&[1.0], &mut sampler).unwrap();
        assert!(matches!(
            public.rotate(&ct, 3),
            Err(Error::ContextMismatch(_))
        ));
    }

    #[test]
    fn test_sum_slots_folds_into_slot_zero() {
        let (private, public, mut sampler) = setup(27);
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ct = private.encrypt_vector(&values, &mut sampler).unwrap();
        let summed = public.sum_slots(&ct, values.len()).unwrap();
        let got = private.decrypt_vector(&summed).unwrap();
        assert!((got[0] - 21.0).abs() < 1e-3, "slot 0 holds {}", got[0]);
    }

    #[test]
    fn test_rescale_exhausts_at_base() {
        let (private, public, mut sampler) = setup(28);
        let mut ct = private.encrypt_vector(&[1.0], &mut sampler).unwrap();
        for _ in 0..3 {
            ct = public.mod_drop(&ct).unwrap();
        }
        assert_eq!(ct.level(), 0);
        assert!(matches!(
            public.rescale(&ct),
            Err(Error::NoiseBudgetExhausted { .. })
        ));
        assert!(matches!(
            public.mod_drop(&ct),
            Err(Error::NoiseBudgetExhausted { .. })
        ));
    }

    #[test]
    fn test_mod_drop_preserves_value() {
        let (private, public, mut sampler) = setup(29);
        let ct = private.encrypt_vector(&[0.75, -1.25], &mut sampler).unwrap();
        let dropped = public.mod_drop(&ct).unwrap();
        assert_eq!(dropped.level(), ct.level() - 1);
        assert_eq!(dropped.scale, ct.scale);
        let got = private.decrypt_vector(&dropped).unwrap();
        assert!((got[0] - 0.75).abs() < 1e-5);
        assert!((got[1] + 1.25).abs() < 1e-5);
    }

    #[test]
    fn test_evaluate_model_matches_reference() {
        let (private, public, mut sampler) = setup(30);
        let model = LinearModel {
            coefficients: vec![0.5, 0.25, -0.125],
            intercept: 0.1,
        };
        let features = [1.0, 2.0, -0.8];
        let ct = private.encrypt_vector(&features, &mut sampler).unwrap();
        let scored = public.evaluate_model(&ct, &model).unwrap();
        assert_eq!(scored.level(), 0);
        let got = private.decrypt_vector(&scored).unwrap();
        let want = plain_score(&model, &features);
        assert!(
            (got[0] - want).abs() < 1e-3,
            "homomorphic {} vs reference {}",
            got[0],
            want
        );
    }

    #[test]
    fn test_evaluate_model_reports_missing_depth() {
        let mut sampler = NoiseSampler::with_seed(3.2, 31);
        let params = CkksParams::custom(64, vec![Q60, Q40A], 40);
        let private = PrivateContext::generate(params, &mut sampler).unwrap();
        let public = private.derive_public();
        let model = LinearModel {
            coefficients: vec![1.0],
            intercept: 0.0,
        };
        let ct = private.encrypt_vector(&[1.0], &mut sampler).unwrap();
        match public.evaluate_model(&ct, &model) {
            Err(Error::NoiseBudgetExhausted {
                required,
                available,
            }) => {
                assert_eq!(required, 3);
                assert_eq!(available, 1);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_sigmoid_approx_reference_points() {
        assert!((sigmoid_approx(0.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid_approx(2.0) - 0.862).abs() < 1e-9);
        assert!((sigmoid_approx(-0.6) - 0.382664).abs() < 1e-9);
    }
}
