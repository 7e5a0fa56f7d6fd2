// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types for the keyenv credential store.
//!
//! Every keyenv crate reports failures through [`KeyenvError`], so the
//! binary can render one error type no matter which layer failed.

pub mod error;

pub use error::{KeyenvError, Result};
