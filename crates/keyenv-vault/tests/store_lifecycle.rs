// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the public store API.
//!
//! Each test gets its own temp directory; nothing touches the user's store.

use std::process::Command;
use std::sync::Arc;
use std::thread;

use keyenv_core::KeyenvError;
use keyenv_vault::{AddOutcome, Store, StorePaths};
use secrecy::ExposeSecret;

fn fresh() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(StorePaths::in_dir(dir.path().join("store")));
    (store, dir)
}

// ---- Full lifecycle ----

#[test]
fn add_list_get_rotate_export_reset() {
    let (store, _dir) = fresh();

    assert_eq!(store.add("OPENAI_API_KEY", "sk-test-1").unwrap(), AddOutcome::Inserted);
    assert_eq!(store.add("GITHUB_TOKEN", "ghp_abc").unwrap(), AddOutcome::Inserted);
    assert_eq!(store.list().unwrap(), ["OPENAI_API_KEY", "GITHUB_TOKEN"]);

    let report = store.rotate_key().unwrap();
    assert_eq!(report.records, 2);
    assert!(report.key_backup.unwrap().exists());

    let exports = store.export_all().unwrap().shell_exports();
    assert_eq!(
        exports.as_str(),
        "export OPENAI_API_KEY='sk-test-1'\nexport GITHUB_TOKEN='ghp_abc'\n"
    );

    let reset = store.reset().unwrap();
    assert!(reset.key_backup.is_some());
    assert!(reset.store_backup.is_some());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn reopening_sees_same_data() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::new(dir.path(), "key.b64", "vault.enc");

    Store::open(paths.clone()).add("A", "1").unwrap();

    let reopened = Store::open(paths.clone());
    assert_eq!(reopened.get("A").unwrap().expose_secret(), "1");
    assert!(paths.key_file.ends_with("key.b64"));
    assert!(paths.store_file.exists());
}

#[test]
fn missing_names_reported_together() {
    let (store, _dir) = fresh();
    store.add("OPENAI_API_KEY", "sk").unwrap();

    let err = store
        .get_many(&["OPENAI_API_KEY", "GITHUB_TOKEN", "SLACK_TOKEN"])
        .unwrap_err();
    assert!(matches!(err, KeyenvError::NotFound { .. }));
    assert_eq!(
        err.to_string(),
        "credential not found: GITHUB_TOKEN, SLACK_TOKEN"
    );
}

// ---- Child process injection ----

#[cfg(unix)]
#[test]
fn credentials_reach_child_environment_only() {
    let (store, _dir) = fresh();
    store.add("OPENAI_API_KEY", "sk-test-1").unwrap();

    let env = store.get_many(&["OPENAI_API_KEY"]).unwrap();
    let mut command = Command::new("sh");
    command.args(["-c", "printf %s \"$OPENAI_API_KEY\""]);
    env.apply_to(&mut command);

    let output = command.output().unwrap();
    assert_eq!(output.stdout, b"sk-test-1");
    assert!(std::env::var_os("OPENAI_API_KEY").is_none());
}

#[cfg(unix)]
#[test]
fn export_lines_round_trip_through_shell() {
    let (store, _dir) = fresh();
    let tricky = "it's a \"quoted\" $VALUE\\n";
    store.add("TRICKY", tricky).unwrap();

    let script = format!(
        "{}printf %s \"$TRICKY\"",
        store.export_all().unwrap().shell_exports().as_str()
    );
    let output = Command::new("sh").args(["-c", &script]).output().unwrap();
    assert_eq!(String::from_utf8(output.stdout).unwrap(), tricky);
}

// ---- Locking ----

#[test]
fn concurrent_adds_are_serialized() {
    let (store, _dir) = fresh();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.add(&format!("KEY_{i}"), &format!("value-{i}")))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let mut names = store.list().unwrap();
    names.sort();
    assert_eq!(names, ["KEY_0", "KEY_1", "KEY_2", "KEY_3"]);
}
