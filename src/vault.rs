//! Sealed transport envelopes for ciphertext payloads.
//!
//! Homomorphic ciphertexts are malleable by design, so they never travel
//! bare: both directions of the protocol wrap them in an authenticated
//! AES-256-GCM envelope under a key the client provisioned with the
//! server out of band. The frame header (version and payload length)
//! rides as associated data, so any bit flipped anywhere in an envelope
//! fails authentication or framing and never yields plaintext.
//!
//! Wire layout: `version u8 | payload_len u32 LE | nonce 12B | body+tag`.

use std::io::Cursor;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Envelope wire version.
const ENVELOPE_VERSION: u8 = 1;
/// Frame header width: version byte plus payload length.
const HEADER_LEN: usize = 5;
/// AES-GCM nonce width.
const NONCE_LEN: usize = 12;
/// Authentication tag width.
const TAG_LEN: usize = 16;

/// 256-bit symmetric transport key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// A sealed payload as it travels on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Vec<u8>);

impl Envelope {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope({} bytes)", self.0.len())
    }
}

/// Draw a fresh transport key from OS entropy.
pub fn generate_key() -> Result<SymmetricKey> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Entropy(e.to_string()))?;
    Ok(SymmetricKey(bytes))
}

/// Seal a payload under the transport key with a fresh random nonce.
pub fn seal(key: &SymmetricKey, payload: &[u8]) -> Result<Envelope> {
    if payload.len() > u32::MAX as usize {
        return Err(Error::MalformedInput(format!(
            "payload of {} bytes exceeds the envelope frame",
            payload.len()
        )));
    }
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.write_u8(ENVELOPE_VERSION)?;
    header.write_u32::<LittleEndian>(payload.len() as u32)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| Error::Entropy(e.to_string()))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let body = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: payload,
                aad: &header,
            },
        )
        .map_err(|_| Error::MalformedInput("payload could not be sealed".into()))?;

    let mut out = header;
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&body);
    Ok(Envelope(out))
}

/// Open an envelope, authenticating frame and body together.
///
/// Returns [`Error::MalformedInput`] when the frame does not parse and
/// [`Error::Authentication`] when it parses but fails the tag check.
pub fn open(key: &SymmetricKey, envelope: &Envelope) -> Result<Vec<u8>> {
    let data = envelope.as_bytes();
    if data.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
        return Err(Error::MalformedInput(format!(
            "envelope of {} bytes is shorter than the minimal frame",
            data.len()
        )));
    }
    let mut cursor = Cursor::new(data);
    let version = cursor.read_u8()?;
    if version != ENVELOPE_VERSION {
        return Err(Error::MalformedInput(format!(
            "unsupported envelope version {version}"
        )));
    }
    let payload_len = cursor.read_u32::<LittleEndian>()? as usize;

    let header = &data[..HEADER_LEN];
    let nonce = &data[HEADER_LEN..HEADER_LEN + NONCE_LEN];
    let body = &data[HEADER_LEN + NONCE_LEN..];

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plain = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: body,
                aad: header,
            },
        )
        .map_err(|_| Error::Authentication)?;

    if plain.len() != payload_len {
        return Err(Error::MalformedInput(
            "payload length does not match the frame".into(),
        ));
    }
    Ok(plain)
}
