// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./keyenv.toml` > `~/.config/keyenv/keyenv.toml` > `/etc/keyenv/keyenv.toml`
//! with environment variable overrides via `KEYENV_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KeyenvConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/keyenv/keyenv.toml";

/// Configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "keyenv.toml";

/// Per-user configuration file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keyenv").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/keyenv/keyenv.toml`
/// 3. `~/.config/keyenv/keyenv.toml`
/// 4. `./keyenv.toml`
/// 5. `KEYENV_*` environment variables
pub fn load_config() -> Result<KeyenvConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<KeyenvConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyenvConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeyenvConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyenvConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KeyenvConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Environment provider mapping `KEYENV_<SECTION>_<FIELD>` to `section.field`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because field names such
/// as `key_file` contain underscores themselves.
fn env_provider() -> Env {
    // Keys reach the closure with the prefix stripped but still uppercase.
    Env::prefixed("KEYENV_").map(|key| {
        key.as_str()
            .to_ascii_lowercase()
            .replacen("store_", "store.", 1)
            .replacen("log_", "log.", 1)
            .into()
    })
}
