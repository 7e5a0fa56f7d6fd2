// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential store encryption: PBKDF2-HMAC-SHA256 key stretching and
//! AES-256-GCM sealing.
//!
//! Every parameter both directions depend on is a named constant below.
//! Each call to [`encrypt`] draws a fresh salt and a fresh 96-bit nonce from
//! the system CSPRNG, so the derived key and nonce never repeat.
//!
//! Envelope layout:
//!
//! ```text
//! MAGIC (4) || salt (16) || nonce (12) || ciphertext || GCM tag (16)
//! ```
//!
//! `MAGIC || salt` is bound as associated data.

use std::num::NonZeroU32;

use keyenv_core::{KeyenvError, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::keys::MasterKey;
use crate::scratch::ScratchBuffer;

/// Envelope format marker and version.
pub const MAGIC: &[u8; MAGIC_LEN] = b"KEV1";

const MAGIC_LEN: usize = 4;

/// PBKDF2 salt length.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Human-readable summary of the pinned parameters.
pub const CIPHER_DESCRIPTION: &str = "AES-256-GCM, PBKDF2-HMAC-SHA256 x100000, 16-byte salt";

const ROUNDS: NonZeroU32 = match NonZeroU32::new(PBKDF2_ITERATIONS) {
    Some(n) => n,
    None => panic!("PBKDF2_ITERATIONS must be non-zero"),
};

const AAD_LEN: usize = MAGIC_LEN + SALT_LEN;
const HEADER_LEN: usize = AAD_LEN + NONCE_LEN;

/// Smallest well-formed envelope (empty plaintext).
pub const MIN_ENVELOPE_LEN: usize = HEADER_LEN + TAG_LEN;

/// Encrypt `plaintext` under `key`.
///
/// The result is never empty: even an empty plaintext yields a full
/// header and tag.
pub fn encrypt(plaintext: &[u8], key: &MasterKey) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut header = [0u8; HEADER_LEN];
    header[..MAGIC_LEN].copy_from_slice(MAGIC);
    rng.fill(&mut header[MAGIC_LEN..])
        .map_err(|_| KeyenvError::Internal("failed to generate salt and nonce".into()))?;

    let (aad, nonce_bytes) = header.split_at(AAD_LEN);
    let sealing = sealing_key(key, &aad[MAGIC_LEN..])?;
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| KeyenvError::Internal("malformed nonce".into()))?;

    // Holds plaintext until sealed; wiped if sealing fails.
    let mut out = Zeroizing::new(Vec::with_capacity(HEADER_LEN + plaintext.len() + TAG_LEN));
    out.extend_from_slice(&header);
    out.extend_from_slice(plaintext);
    let tag = sealing
        .seal_in_place_separate_tag(nonce, Aad::from(aad), &mut out[HEADER_LEN..])
        .map_err(|_| KeyenvError::Internal("AES-256-GCM encryption failed".into()))?;
    out.extend_from_slice(tag.as_ref());

    debug_assert!(out.len() >= MIN_ENVELOPE_LEN);
    Ok(std::mem::take(&mut *out))
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Wrong key, tampering, truncation and an unknown format marker all yield
/// [`KeyenvError::Decryption`]. `envelope` is only read.
pub fn decrypt(envelope: &[u8], key: &MasterKey) -> Result<ScratchBuffer> {
    if envelope.len() < MIN_ENVELOPE_LEN || !envelope.starts_with(MAGIC) {
        return Err(KeyenvError::Decryption);
    }
    let (header, sealed) = envelope.split_at(HEADER_LEN);
    let (aad, nonce_bytes) = header.split_at(AAD_LEN);

    let opening = sealing_key(key, &aad[MAGIC_LEN..])?;
    let nonce =
        Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| KeyenvError::Decryption)?;

    let mut buf = ScratchBuffer::from_vec(sealed.to_vec());
    let plain_len = opening
        .open_in_place(nonce, Aad::from(aad), buf.as_mut_vec())
        .map_err(|_| KeyenvError::Decryption)?
        .len();
    buf.truncate(plain_len);
    Ok(buf)
}

/// Stretch the master key with the envelope's salt into an AES key.
fn sealing_key(key: &MasterKey, salt: &[u8]) -> Result<LessSafeKey> {
    let mut derived = Zeroizing::new([0u8; 32]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        ROUNDS,
        salt,
        key.as_bytes(),
        derived.as_mut(),
    );
    let unbound = UnboundKey::new(&AES_256_GCM, derived.as_ref())
        .map_err(|_| KeyenvError::Internal("failed to create AES-256-GCM key".into()))?;
    Ok(LessSafeKey::new(unbound))
}
