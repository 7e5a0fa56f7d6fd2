// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! store file names must be plain names inside the store directory, and the
//! log level must be one `tracing` understands.

use crate::diagnostic::ConfigError;
use crate::model::KeyenvConfig;

/// Log levels accepted by `log.level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &KeyenvConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    check_file_name("store.key_file", &config.store.key_file, &mut errors);
    check_file_name("store.store_file", &config.store.store_file, &mut errors);

    if config.store.key_file.trim() == config.store.store_file.trim() {
        errors.push(ConfigError::Validation {
            message: format!(
                "store.key_file and store.store_file must differ, both are `{}`",
                config.store.key_file
            ),
        });
    }

    if let Some(dir) = &config.store.dir
        && dir.contains('\0')
    {
        errors.push(ConfigError::Validation {
            message: "store.dir must not contain NUL bytes".to_string(),
        });
    }

    let level = config.log.level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_file_name(key: &str, value: &str, errors: &mut Vec<ConfigError>) {
    let value = value.trim();
    if value.is_empty() {
        errors.push(ConfigError::Validation {
            message: format!("{key} must not be empty"),
        });
    } else if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        errors.push(ConfigError::Validation {
            message: format!("{key} `{value}` must be a file name, not a path"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&KeyenvConfig::default()).is_ok());
    }

    #[test]
    fn empty_key_file_fails_validation() {
        let mut config = KeyenvConfig::default();
        config.store.key_file = " ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "store.key_file must not be empty"));
    }

    #[test]
    fn path_like_store_file_fails_validation() {
        let mut config = KeyenvConfig::default();
        config.store.store_file = "../elsewhere.enc".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "must be a file name"));
    }

    #[test]
    fn identical_file_names_fail_validation() {
        let mut config = KeyenvConfig::default();
        config.store.store_file = config.store.key_file.clone();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "must differ"));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = KeyenvConfig::default();
        config.log.level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "log.level"));
    }

    #[test]
    fn errors_are_collected_not_fail_fast() {
        let mut config = KeyenvConfig::default();
        config.store.key_file = String::new();
        config.log.level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
