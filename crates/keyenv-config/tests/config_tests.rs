// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the keyenv configuration system.

use keyenv_config::diagnostic::ConfigError;
use keyenv_config::model::KeyenvConfig;
use keyenv_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use serial_test::serial;

/// Valid TOML with every known field deserializes.
#[test]
fn full_config_deserializes() {
    let toml = r#"
[store]
dir = "/srv/keyenv"
key_file = "key.b64"
store_file = "vault.enc"
lock = false

[log]
level = "info"
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.store.dir.as_deref(), Some("/srv/keyenv"));
    assert_eq!(config.store.key_file, "key.b64");
    assert_eq!(config.store.store_file, "vault.enc");
    assert!(!config.store.lock);
    assert_eq!(config.log.level, "info");
    assert_eq!(
        config.store.resolved_dir(),
        Some(std::path::PathBuf::from("/srv/keyenv"))
    );
}

/// Defaults describe a locked store with the standard file names.
#[test]
fn defaults_are_sensible() {
    let config = KeyenvConfig::default();
    assert!(config.store.dir.is_none());
    assert_eq!(config.store.key_file, "master.key");
    assert_eq!(config.store.store_file, "credentials.enc");
    assert!(config.store.lock);
    assert_eq!(config.log.level, "warn");
}

/// A typo inside [store] is reported with a suggestion.
#[test]
fn typo_in_store_section_suggests_fix() {
    let errors = load_and_validate_str("[store]\nstor_file = \"x.enc\"\n").unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "stor_file");
            assert_eq!(suggestion.as_deref(), Some("store_file"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// An unknown top-level section is rejected rather than ignored.
#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[vault]\npath = \"/tmp\"\n").unwrap_err();
    assert!(matches!(&errors[0], ConfigError::UnknownKey { key, .. } if key == "vault"));
}

/// A string where a boolean belongs is a type error naming the key.
#[test]
fn wrong_type_names_the_key() {
    let errors = load_and_validate_str("[store]\nlock = \"yes\"\n").unwrap_err();
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert_eq!(key, "store.lock"),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

/// Every semantic problem is reported in one pass.
#[test]
fn validation_collects_all_errors() {
    let toml = r#"
[store]
key_file = ""
store_file = "../escape.enc"

[log]
level = "loud"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(errors
        .iter()
        .all(|e| matches!(e, ConfigError::Validation { .. })));
}

/// Same name for key and store file would make one overwrite the other.
#[test]
fn key_and_store_file_must_differ() {
    let errors =
        load_and_validate_str("[store]\nkey_file = \"same\"\nstore_file = \"same\"\n").unwrap_err();
    assert!(errors[0].to_string().contains("must differ"));
}

/// Deserialization alone does not run semantic validation.
#[test]
fn raw_load_skips_validation() {
    let config = load_config_from_str("[log]\nlevel = \"loud\"\n").unwrap();
    assert_eq!(config.log.level, "loud");
}

/// Config read from an explicit file, typo included.
#[test]
#[serial]
fn file_errors_carry_the_bad_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyenv.toml");
    std::fs::write(&path, "[log]\nlevle = \"debug\"\n").unwrap();

    let errors = load_and_validate_path(&path).unwrap_err();
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "levle");
            assert_eq!(suggestion.as_deref(), Some("level"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// KEYENV_STORE_LOCK flips locking off without a file.
#[test]
#[serial]
fn env_disables_locking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    // SAFETY: test-only env mutation, serialized with #[serial].
    unsafe { std::env::set_var("KEYENV_STORE_LOCK", "false") };
    let result = load_and_validate_path(&path);
    unsafe { std::env::remove_var("KEYENV_STORE_LOCK") };

    assert!(!result.unwrap().store.lock);
}

/// Rendering diagnostics never panics, with or without source spans.
#[test]
fn render_errors_handles_every_variant() {
    let errors = vec![
        ConfigError::MissingKey {
            key: "store".to_string(),
        },
        ConfigError::Validation {
            message: "bad".to_string(),
        },
        ConfigError::Other("odd".to_string()),
    ];
    keyenv_config::render_errors(&errors);
}
