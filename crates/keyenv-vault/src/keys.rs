// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master key lifecycle: create once, load, rotate, commit and restore.
//!
//! The key file holds the standard base64 encoding of 32 random bytes and
//! nothing else. It is only ever replaced wholesale through
//! [`crate::fsio`], never edited in place.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyenv_core::{KeyenvError, Result};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::fsio;

/// Length of the raw master key in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// The symmetric secret every credential store encryption is keyed from.
///
/// Debug output omits the key material.
pub struct MasterKey {
    bytes: Zeroizing<[u8; MASTER_KEY_LEN]>,
}

impl MasterKey {
    /// Fresh key from the system CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        SystemRandom::new()
            .fill(bytes.as_mut())
            .map_err(|_| KeyenvError::Internal("failed to generate random master key".into()))?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }

    /// Base64 text as stored in the key file.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(&self.bytes[..]))
    }

    /// Decode key file text. Surrounding whitespace is ignored.
    pub fn from_base64(text: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(text.trim())
                .map_err(|e| KeyenvError::key_access(format!("key file is not base64: {e}"), None))?,
        );
        let bytes: [u8; MASTER_KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            KeyenvError::key_access(
                format!(
                    "key file holds {} bytes, expected {MASTER_KEY_LEN}",
                    decoded.len()
                ),
                None,
            )
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Constant-time equality, for tests and sanity checks.
    pub fn same_as(&self, other: &MasterKey) -> bool {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey").field("bytes", &"[REDACTED]").finish()
    }
}

/// Old and new key material handed back by [`KeyManager::rotate`].
///
/// Nothing on disk points at `new` until the caller commits it.
#[derive(Debug)]
pub struct KeyRotation {
    /// Key the current ciphertext is encrypted under.
    pub old: MasterKey,
    /// Freshly generated replacement.
    pub new: MasterKey,
    /// Timestamped copy of the old key file.
    pub backup: Option<PathBuf>,
}

/// Owns the key file path and every operation on it.
#[derive(Debug, Clone)]
pub struct KeyManager {
    path: PathBuf,
}

impl KeyManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the key file if it does not exist yet.
    ///
    /// Never overwrites: if another process wins the race the existing key is
    /// kept. Returns `true` when this call created the key. Failing to
    /// restrict the new file's permissions is fatal here.
    pub fn ensure_key_exists(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        let key = MasterKey::generate()?;
        let encoded = key.to_base64();
        let created = fsio::stage(&self.path, encoded.as_bytes())?.commit_new()?;
        if created {
            info!(path = %self.path.display(), "master key created");
        }
        Ok(created)
    }

    /// Read and decode the active key.
    ///
    /// A key file with loose permissions is tightened, or a warning logged
    /// if that fails.
    pub fn load(&self) -> Result<MasterKey> {
        let text = Zeroizing::new(std::fs::read_to_string(&self.path).map_err(|e| {
            KeyenvError::key_access(format!("cannot read {}", self.path.display()), Some(e))
        })?);
        fsio::tighten_or_warn(&self.path);
        MasterKey::from_base64(&text)
    }

    /// Back up the current key file and generate its replacement.
    ///
    /// `current` must be the key that decrypts the store right now; it is
    /// returned as [`KeyRotation::old`] so the caller can roll back.
    pub fn rotate(&self, current: MasterKey, stamp: &str) -> Result<KeyRotation> {
        let backup = fsio::backup_copy(&self.path, stamp)?;
        let new = MasterKey::generate()?;
        debug!(backup = ?backup, "replacement master key generated");
        Ok(KeyRotation {
            old: current,
            new,
            backup,
        })
    }

    /// Atomically make `key` the active key.
    pub fn commit(&self, key: &MasterKey) -> Result<()> {
        let encoded = key.to_base64();
        fsio::write_atomic(&self.path, encoded.as_bytes()).map_err(|e| match e {
            KeyenvError::Persist { source, .. } => KeyenvError::key_access(
                format!("cannot write {}", self.path.display()),
                Some(source),
            ),
            other => other,
        })
    }

    /// Reinstate the pre-rotation key after a failed re-encryption.
    pub fn restore(&self, rotation: &KeyRotation) -> Result<()> {
        self.commit(&rotation.old)?;
        info!(path = %self.path.display(), "previous master key restored");
        Ok(())
    }
}
