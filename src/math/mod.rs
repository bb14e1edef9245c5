//! Mathematical primitives for encrypted scoring.
//!
//! This module provides the core operations the homomorphic layer is
//! built on:
//!
//! - **Modular arithmetic** over word-sized primes
//! - **RNS polynomials** over R_Q = Z_Q[X]/(X^n + 1) with Q a product of limbs
//! - **Number-Theoretic Transform (NTT)** for fast polynomial multiplication
//! - **Noise sampling** for secret keys, masks, and error terms
//!
//! # Overview
//!
//! All ring elements are carried in RNS form: one residue vector per prime
//! limb, so no arithmetic ever leaves u64/u128. Rescaling after each
//! homomorphic multiplication drops the last limb, which is why the limb
//! count of a ciphertext shrinks as a computation deepens.
//!
//! # Example
//!
//! ```
//! use cloakscore::math::{NttTables, RnsPoly};
//!
//! let moduli = [1099511480321u64];
//! let tables = NttTables::new(256, moduli[0]).unwrap();
//! let mut poly = RnsPoly::from_signed(&[1; 256], &moduli);
//! cloakscore::math::ntt::forward_rns(&mut poly, std::slice::from_ref(&tables));
//! ```

pub mod ntt;
pub mod rns;
pub mod sampler;

pub use ntt::NttTables;
pub use rns::RnsPoly;
pub use sampler::{NoiseSampler, DEFAULT_SIGMA};
