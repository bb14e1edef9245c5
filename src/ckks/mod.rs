//! Leveled approximate homomorphic encryption over packed real vectors.
//!
//! The scheme encrypts up to n/2 reals per ciphertext via the canonical
//! embedding and supports slotwise addition, multiplication, and
//! rotation. Multiplications consume levels from an RNS modulus chain;
//! the scoring circuit in [`eval`] budgets exactly three.
//!
//! Key material splits into a [`PrivateContext`] (client-held, can
//! decrypt) and a [`PublicContext`] (shipped with requests, can only
//! evaluate). Ciphertexts and contexts both carry a parameter
//! fingerprint, and every operation checks it before touching limbs.

pub mod ciphertext;
pub mod context;
pub mod encoding;
pub mod eval;
pub mod galois;
pub mod keyswitch;

pub use ciphertext::Ciphertext;
pub use context::{EvalKeys, PrivateContext, PublicContext, SecretKey};
pub use encoding::CkksEncoder;
pub use eval::{plain_score, sigmoid_approx, CIRCUIT_DEPTH};
pub use keyswitch::KeySwitchKey;
