// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted local credential store.
//!
//! A random 256-bit master key lives in its own file. Credentials are kept
//! as a dotenv-style document, encrypted with AES-256-GCM under a key
//! derived from the master key with PBKDF2 and a fresh salt per write.
//! Plaintext only ever exists in zeroize-on-drop buffers.

pub mod cipher;
pub mod codec;
pub mod env;
pub mod fsio;
pub mod keys;
pub mod prompt;
pub mod scratch;
pub mod store;

pub use env::CredentialEnv;
pub use keys::{KeyManager, MasterKey};
pub use prompt::read_value;
pub use store::{
    AddOutcome, Diagnostics, FileStatus, ResetReport, RotationReport, Store, StorePaths,
};
