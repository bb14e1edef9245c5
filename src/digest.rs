//! Domain-separated SHA-256 digests.
//!
//! Integrity digests are computed over the sealed envelopes exactly as
//! transmitted, with a one-byte domain prefix so a request digest can never
//! collide with a result digest for the same bytes.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub const DIGEST_LEN: usize = 32;

/// Domain tag for the sealed request envelope (client to server).
pub const DOMAIN_REQUEST: u8 = 0x01;
/// Domain tag for the sealed result envelope (server to client).
pub const DOMAIN_RESULT: u8 = 0x02;
/// Domain tag for parameter fingerprints.
pub const DOMAIN_PARAMS: u8 = 0x03;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse the 64-character lowercase hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != DIGEST_LEN * 2 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; DIGEST_LEN];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}..)", self.short())
    }
}

/// Hash `data` under a one-byte domain prefix.
pub fn hash_with_domain(domain: u8, data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([domain]);
    hasher.update(data);
    Digest(hasher.finalize().into())
}

/// Digest of a sealed request envelope.
pub fn request_digest(envelope_bytes: &[u8]) -> Digest {
    hash_with_domain(DOMAIN_REQUEST, envelope_bytes)
}

/// Digest of a sealed result envelope.
pub fn result_digest(envelope_bytes: &[u8]) -> Digest {
    hash_with_domain(DOMAIN_RESULT, envelope_bytes)
}

/// Short fingerprint of an encoded parameter set, used to detect artifact
/// mixing across contexts before any arithmetic happens.
pub fn params_fingerprint(encoded_params: &[u8]) -> u64 {
    let d = hash_with_domain(DOMAIN_PARAMS, encoded_params);
    u64::from_le_bytes([
        d.0[0], d.0[1], d.0[2], d.0[3], d.0[4], d.0[5], d.0[6], d.0[7],
    ])
}
