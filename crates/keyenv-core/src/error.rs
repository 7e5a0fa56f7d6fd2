// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the keyenv credential store.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the keyenv crates.
pub type Result<T, E = KeyenvError> = std::result::Result<T, E>;

/// The error type returned by every store, key and codec operation.
#[derive(Debug, Error)]
pub enum KeyenvError {
    /// Empty or malformed credential name or value.
    #[error("invalid credential: {0}")]
    Validation(String),

    /// One or more requested credentials are absent.
    #[error("credential not found: {}", .names.join(", "))]
    NotFound { names: Vec<String> },

    /// The master key could not be read, decoded or written.
    #[error("master key unavailable: {message}")]
    KeyAccess {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Ciphertext could not be opened under the current key.
    ///
    /// Wrong key, tampering and truncation all map here on purpose.
    #[error("credential store could not be decrypted -- wrong key or corrupted data")]
    Decryption,

    /// Atomic replacement of a store artifact failed.
    #[error("failed to persist {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Owner-only permissions could not be applied.
    #[error("failed to restrict permissions on {}: {source}", .path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The advisory store lock could not be taken.
    #[error("store lock unavailable: {0}")]
    Lock(String),

    /// Invalid or unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors (RNG or cipher setup failures).
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeyenvError {
    /// Build a [`KeyenvError::NotFound`] from any list of names.
    pub fn not_found<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::NotFound {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a [`KeyenvError::KeyAccess`] with an optional I/O cause.
    pub fn key_access(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Self::KeyAccess {
            message: message.into(),
            source,
        }
    }

    /// Names carried by a `NotFound` error, if this is one.
    pub fn missing_names(&self) -> Option<&[String]> {
        match self {
            Self::NotFound { names } => Some(names),
            _ => None,
        }
    }
}
