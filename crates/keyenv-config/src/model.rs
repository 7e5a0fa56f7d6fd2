// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for keyenv.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of being silently ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level keyenv configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeyenvConfig {
    /// Where the master key and encrypted credentials live.
    #[serde(default)]
    pub store: StoreConfig,

    /// Diagnostic logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Store location and locking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store directory. `None` means `<data dir>/keyenv`.
    ///
    /// A leading `~/` is expanded against the home directory.
    #[serde(default)]
    pub dir: Option<String>,

    /// File name of the base64 master key inside the store directory.
    #[serde(default = "default_key_file")]
    pub key_file: String,

    /// File name of the encrypted credential set inside the store directory.
    #[serde(default = "default_store_file")]
    pub store_file: String,

    /// Take an advisory lock around every load/persist cycle.
    #[serde(default = "default_lock")]
    pub lock: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: None,
            key_file: default_key_file(),
            store_file: default_store_file(),
            lock: default_lock(),
        }
    }
}

impl StoreConfig {
    /// Resolve the store directory, applying `~/` expansion and the
    /// platform data-directory fallback.
    ///
    /// Returns `None` only when no directory is configured and the platform
    /// has no data directory either.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        match self.dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => Some(expand_home(dir)),
            _ => dirs::data_dir().map(|d| d.join("keyenv")),
        }
    }
}

fn expand_home(dir: &str) -> PathBuf {
    if let Some(rest) = dir.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(dir)
}

fn default_key_file() -> String {
    "master.key".to_string()
}

fn default_store_file() -> String {
    "credentials.enc".to_string()
}

fn default_lock() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_name_the_standard_files() {
        let config = KeyenvConfig::default();
        assert_eq!(config.store.key_file, "master.key");
        assert_eq!(config.store.store_file, "credentials.enc");
        assert!(config.store.lock);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn explicit_dir_wins_over_data_dir() {
        let store = StoreConfig {
            dir: Some("/srv/keys".to_string()),
            ..StoreConfig::default()
        };
        assert_eq!(store.resolved_dir(), Some(PathBuf::from("/srv/keys")));
    }

    #[test]
    fn tilde_dir_expands_to_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let store = StoreConfig {
            dir: Some("~/.keyenv".to_string()),
            ..StoreConfig::default()
        };
        assert_eq!(store.resolved_dir(), Some(home.join(".keyenv")));
    }

    #[test]
    fn blank_dir_falls_back_to_data_dir() {
        let store = StoreConfig {
            dir: Some("   ".to_string()),
            ..StoreConfig::default()
        };
        assert_eq!(
            store.resolved_dir(),
            dirs::data_dir().map(|d| d.join("keyenv"))
        );
    }

    #[test]
    fn unknown_store_key_is_rejected() {
        let toml_str = r#"
[store]
dir = "/tmp/k"
passphrase = "nope"
"#;
        assert!(toml::from_str::<KeyenvConfig>(toml_str).is_err());
    }
}
