// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The credential store: every operation is one pass through
//! `LOAD -> MUTATE -> PERSIST -> CLEANUP`.
//!
//! - LOAD decrypts the store file into a wipe-on-drop [`CredentialSet`]. A
//!   missing or empty file is an empty set, not an error.
//! - MUTATE applies at most one logical change in memory.
//! - PERSIST serializes, encrypts, stages the ciphertext beside the store
//!   file and renames it into place. Read-only operations skip it.
//! - CLEANUP is the drop of the decrypted set and every scratch buffer,
//!   which happens on every exit path including `?` returns.
//!
//! Mutating operations hold an exclusive advisory lock from LOAD through
//! PERSIST; reads hold a shared one.

use std::fs;
use std::path::{Path, PathBuf};

use keyenv_core::{KeyenvError, Result};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::cipher;
use crate::codec::{self, CredentialSet, Upsert};
use crate::env::CredentialEnv;
use crate::fsio::{self, LockMode, StoreLock};
use crate::keys::{KeyManager, KeyRotation, MasterKey};

/// Default key file name inside the store directory.
pub const DEFAULT_KEY_FILE: &str = "master.key";

/// Default credential file name inside the store directory.
pub const DEFAULT_STORE_FILE: &str = "credentials.enc";

/// Lock file name inside the store directory.
pub const LOCK_FILE: &str = ".lock";

/// Where a store keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub key_file: PathBuf,
    pub store_file: PathBuf,
    pub lock_file: PathBuf,
}

impl StorePaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_KEY_FILE, DEFAULT_STORE_FILE)
    }

    /// Custom file names inside `dir`.
    pub fn new(dir: impl Into<PathBuf>, key_file: &str, store_file: &str) -> Self {
        let dir = dir.into();
        Self {
            key_file: dir.join(key_file),
            store_file: dir.join(store_file),
            lock_file: dir.join(LOCK_FILE),
            dir,
        }
    }
}

/// The protocol step an operation is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Mutate,
    Persist,
    Cleanup,
}

/// Result of [`Store::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Updated,
}

impl From<Upsert> for AddOutcome {
    fn from(value: Upsert) -> Self {
        match value {
            Upsert::Inserted => Self::Inserted,
            Upsert::Updated => Self::Updated,
        }
    }
}

/// What [`Store::rotate_key`] did.
#[derive(Debug, Clone)]
pub struct RotationReport {
    /// Credentials re-encrypted under the new key.
    pub records: usize,
    /// Copy of the previous key file.
    pub key_backup: Option<PathBuf>,
    /// Copy of the previous ciphertext.
    pub store_backup: Option<PathBuf>,
}

/// What [`Store::reset`] set aside before starting over.
#[derive(Debug, Clone)]
pub struct ResetReport {
    pub key_backup: Option<PathBuf>,
    pub store_backup: Option<PathBuf>,
}

/// Facts about one store file, for `debug`.
#[derive(Debug, Clone)]
pub struct FileStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub size: Option<u64>,
    pub mode: Option<u32>,
}

impl FileStatus {
    fn probe(path: &Path) -> Self {
        let meta = fs::metadata(path).ok();
        Self {
            path: path.to_path_buf(),
            exists: meta.is_some(),
            size: meta.map(|m| m.len()),
            mode: fsio::mode_of(path),
        }
    }
}

/// Read-only health report. Never contains key material or values.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub dir: FileStatus,
    pub key: FileStatus,
    pub store: FileStatus,
    pub locking: bool,
    pub cipher: &'static str,
    /// Number of credentials, or why the store could not be read.
    pub records: std::result::Result<usize, String>,
}

/// Change signalled by a MUTATE step.
enum Change<T> {
    /// Nothing to persist.
    Unchanged(T),
    /// The set was modified and must be written back.
    Changed(T),
}

/// Handle on one credential store directory.
#[derive(Debug)]
pub struct Store {
    paths: StorePaths,
    keys: KeyManager,
    locking: bool,
    #[cfg(test)]
    fail_at: std::cell::Cell<Option<Stage>>,
}

impl Store {
    /// Open a store. Nothing touches the disk until the first operation.
    pub fn open(paths: StorePaths) -> Self {
        Self {
            keys: KeyManager::new(&paths.key_file),
            paths,
            locking: true,
            #[cfg(test)]
            fail_at: std::cell::Cell::new(None),
        }
    }

    /// Enable or disable the advisory lock (enabled by default).
    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Names of all credentials, in store order.
    pub fn list(&self) -> Result<Vec<String>> {
        self.read(|set| Ok(set.names().map(str::to_string).collect()))
    }

    /// Insert or update a credential.
    pub fn add(&self, name: &str, value: &str) -> Result<AddOutcome> {
        codec::validate_name(name)?;
        codec::validate_value(value)?;
        let outcome = self.transact(|set| {
            if set.find(name).is_some_and(|r| r.value == value) {
                return Ok(Change::Unchanged(AddOutcome::Updated));
            }
            Ok(Change::Changed(AddOutcome::from(set.upsert(name, value))))
        })?;
        info!(%name, ?outcome, "credential stored");
        Ok(outcome)
    }

    /// Delete a credential. An absent name leaves the store untouched.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.transact(|set| {
            if set.delete(name) {
                Ok(Change::Changed(()))
            } else {
                Err(KeyenvError::not_found([name]))
            }
        })?;
        info!(%name, "credential removed");
        Ok(())
    }

    /// Value of one credential.
    pub fn get(&self, name: &str) -> Result<SecretString> {
        self.read(|set| {
            set.find(name)
                .map(|r| SecretString::from(r.value.clone()))
                .ok_or_else(|| KeyenvError::not_found([name]))
        })
    }

    /// Values for several credentials, all or nothing.
    ///
    /// Every missing name is reported together. Repeated names are bound once.
    pub fn get_many<S: AsRef<str>>(&self, names: &[S]) -> Result<CredentialEnv> {
        self.read(|set| {
            let mut env = CredentialEnv::default();
            let mut missing = Vec::new();
            for name in names.iter().map(AsRef::as_ref) {
                if env.get(name).is_some() || missing.iter().any(|m: &String| m == name) {
                    continue;
                }
                match set.find(name) {
                    Some(record) => env.push(&record.name, &record.value),
                    None => missing.push(name.to_string()),
                }
            }
            if missing.is_empty() {
                Ok(env)
            } else {
                Err(KeyenvError::NotFound { names: missing })
            }
        })
    }

    /// Every credential, in store order.
    pub fn export_all(&self) -> Result<CredentialEnv> {
        self.read(|set| {
            let mut env = CredentialEnv::default();
            for record in set.records() {
                env.push(&record.name, &record.value);
            }
            Ok(env)
        })
    }

    /// Re-encrypt everything under a freshly generated master key.
    ///
    /// The new key is committed before the new ciphertext; if anything after
    /// key generation fails, the old key is put back so the untouched store
    /// file stays readable.
    pub fn rotate_key(&self) -> Result<RotationReport> {
        fsio::ensure_private_dir(&self.paths.dir)?;
        let _lock = self.lock(LockMode::Exclusive)?;

        let current = self.active_key()?;
        let set = self.load_set(&current)?;
        self.checkpoint(Stage::Mutate)?;

        let stamp = fsio::timestamp();
        let store_backup = fsio::backup_copy(&self.paths.store_file, &stamp)?;
        let rotation = self.keys.rotate(current, &stamp)?;

        if let Err(err) = self.reencrypt(&set, &rotation) {
            match self.keys.restore(&rotation) {
                Ok(()) => warn!(error = %err, "key rotation failed, previous key restored"),
                Err(restore_err) => warn!(
                    error = %err,
                    restore_error = %restore_err,
                    backup = ?rotation.backup,
                    "key rotation failed and the previous key could not be restored"
                ),
            }
            return Err(err);
        }

        info!(records = set.len(), "master key rotated");
        Ok(RotationReport {
            records: set.len(),
            key_backup: rotation.backup,
            store_backup,
        })
    }

    fn reencrypt(&self, set: &CredentialSet, rotation: &KeyRotation) -> Result<()> {
        let staged = self.stage_set(set, &rotation.new)?;
        self.keys.commit(&rotation.new)?;
        self.checkpoint(Stage::Persist)?;
        staged.commit()
    }

    /// Set the current key and ciphertext aside and start an empty store.
    pub fn reset(&self) -> Result<ResetReport> {
        fsio::ensure_private_dir(&self.paths.dir)?;
        let _lock = self.lock(LockMode::Exclusive)?;

        let stamp = fsio::timestamp();
        let store_backup = fsio::backup_copy(&self.paths.store_file, &stamp)?;
        let key_backup = fsio::backup_copy(&self.paths.key_file, &stamp)?;

        let key = MasterKey::generate()?;
        let staged = self.stage_set(&CredentialSet::new(), &key)?;
        self.keys.commit(&key)?;
        if let Err(err) = self.checkpoint(Stage::Persist).and_then(|()| staged.commit()) {
            // Put the old key back so the old ciphertext stays readable.
            if let Some(backup) = &key_backup {
                let restored = fs::read(backup)
                    .map_err(|source| KeyenvError::Persist {
                        path: backup.clone(),
                        source,
                    })
                    .and_then(|bytes| fsio::write_atomic(&self.paths.key_file, &bytes));
                if let Err(restore_err) = restored {
                    warn!(
                        error = %restore_err,
                        backup = %backup.display(),
                        "reset failed and the previous key could not be restored"
                    );
                }
            }
            return Err(err);
        }

        info!(?key_backup, ?store_backup, "store reset");
        Ok(ResetReport {
            key_backup,
            store_backup,
        })
    }

    /// Inspect the store without modifying it.
    pub fn diagnostics(&self) -> Diagnostics {
        let records = self
            .list()
            .map(|names| names.len())
            .map_err(|e| e.to_string());
        Diagnostics {
            dir: FileStatus::probe(&self.paths.dir),
            key: FileStatus::probe(&self.paths.key_file),
            store: FileStatus::probe(&self.paths.store_file),
            locking: self.locking,
            cipher: cipher::CIPHER_DESCRIPTION,
            records,
        }
    }

    /// LOAD, then a read-only scan.
    ///
    /// Creates nothing when the store directory is absent. Inside an existing
    /// directory the only file it may create is the lock file.
    fn read<T>(&self, scan: impl FnOnce(&CredentialSet) -> Result<T>) -> Result<T> {
        let _lock = if self.paths.dir.is_dir() {
            self.lock(LockMode::Shared)?
        } else {
            None
        };
        let set = match self.store_bytes()? {
            None => CredentialSet::new(),
            Some(envelope) => {
                let key = self.keys.load()?;
                self.decrypt_set(&envelope, &key)?
            }
        };
        scan(&set)
        // CLEANUP: `set` is wiped here.
    }

    /// LOAD -> MUTATE -> PERSIST under the exclusive lock.
    fn transact<T>(&self, mutate: impl FnOnce(&mut CredentialSet) -> Result<Change<T>>) -> Result<T> {
        fsio::ensure_private_dir(&self.paths.dir)?;
        let _lock = self.lock(LockMode::Exclusive)?;

        let key = self.active_key()?;
        let mut set = self.load_set(&key)?;

        self.checkpoint(Stage::Mutate)?;
        let value = match mutate(&mut set)? {
            Change::Unchanged(value) => value,
            Change::Changed(value) => {
                let staged = self.stage_set(&set, &key)?;
                self.checkpoint(Stage::Persist)?;
                staged.commit()?;
                value
            }
        };
        self.checkpoint(Stage::Cleanup)?;
        Ok(value)
        // CLEANUP: `set` and `key` are wiped here, or at whichever `?` returned.
    }

    /// Key for a mutating operation, created on first use.
    fn active_key(&self) -> Result<MasterKey> {
        if !self.keys.exists() && self.store_bytes()?.is_some() {
            // A fresh key can never open an existing store.
            return Err(KeyenvError::key_access(
                format!(
                    "{} is missing but {} exists; restore the key from a backup or run reset",
                    self.keys.path().display(),
                    self.paths.store_file.display()
                ),
                None,
            ));
        }
        self.keys.ensure_key_exists()?;
        self.keys.load()
    }

    fn load_set(&self, key: &MasterKey) -> Result<CredentialSet> {
        self.checkpoint(Stage::Load)?;
        match self.store_bytes()? {
            None => {
                debug!("no store file yet, starting empty");
                Ok(CredentialSet::new())
            }
            Some(envelope) => self.decrypt_set(&envelope, key),
        }
    }

    fn decrypt_set(&self, envelope: &[u8], key: &MasterKey) -> Result<CredentialSet> {
        let plaintext = cipher::decrypt(envelope, key)?;
        let set = codec::parse(&plaintext).map_err(|e| {
            debug!(error = %e, "decrypted store is not a credential set");
            KeyenvError::Decryption
        })?;
        debug!(records = set.len(), "store decrypted");
        Ok(set)
        // `plaintext` is wiped here.
    }

    fn stage_set(&self, set: &CredentialSet, key: &MasterKey) -> Result<fsio::StagedFile> {
        let plaintext = codec::serialize(set)?;
        let envelope = cipher::encrypt(&plaintext, key)?;
        drop(plaintext);
        fsio::stage(&self.paths.store_file, &envelope)
    }

    /// Raw ciphertext, or `None` for the bootstrap case (missing or empty).
    fn store_bytes(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.paths.store_file) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KeyenvError::Persist {
                path: self.paths.store_file.clone(),
                source,
            }),
        }
    }

    fn lock(&self, mode: LockMode) -> Result<Option<StoreLock>> {
        if !self.locking {
            return Ok(None);
        }
        StoreLock::acquire(&self.paths.lock_file, mode).map(Some)
    }

    #[cfg(not(test))]
    fn checkpoint(&self, _stage: Stage) -> Result<()> {
        Ok(())
    }

    #[cfg(test)]
    fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.fail_at.get() == Some(stage) {
            self.fail_at.set(None);
            return Err(KeyenvError::Persist {
                path: self.paths.store_file.clone(),
                source: std::io::Error::other(format!("injected failure at {stage:?}")),
            });
        }
        Ok(())
    }

    #[cfg(test)]
    fn fail_next_at(&self, stage: Stage) {
        self.fail_at.set(Some(stage));
    }
}
