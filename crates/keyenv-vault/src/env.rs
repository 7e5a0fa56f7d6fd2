// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed credential bindings handed to callers.
//!
//! A [`CredentialEnv`] is what `use`, `export` and `run` consume instead of
//! text for a shell to evaluate. It can populate a child process
//! environment directly, or render `export` lines when the caller really
//! wants shell syntax.

use std::fmt;
use std::process::Command;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

/// Ordered name -> value bindings. Values are wiped on drop.
#[derive(Default)]
pub struct CredentialEnv {
    vars: Vec<(String, SecretString)>,
}

impl CredentialEnv {
    pub(crate) fn push(&mut self, name: &str, value: &str) {
        self.vars
            .push((name.to_string(), SecretString::from(value.to_string())));
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Add every binding to `command`'s environment.
    pub fn apply_to(&self, command: &mut Command) {
        for (name, value) in &self.vars {
            command.env(name, value.expose_secret());
        }
    }

    /// One `export NAME='value'` line per binding, newline terminated.
    pub fn shell_exports(&self) -> Zeroizing<String> {
        let mut out = Zeroizing::new(String::new());
        for (name, value) in &self.vars {
            out.push_str("export ");
            out.push_str(name);
            out.push('=');
            push_shell_quoted(&mut out, value.expose_secret());
            out.push('\n');
        }
        out
    }
}

impl fmt::Debug for CredentialEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEnv")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Single-quote `value` for POSIX shells; embedded `'` becomes `'\''`.
pub fn push_shell_quoted(out: &mut String, value: &str) {
    out.push('\'');
    for (i, part) in value.split('\'').enumerate() {
        if i > 0 {
            out.push_str("'\\''");
        }
        out.push_str(part);
    }
    out.push('\'');
}
