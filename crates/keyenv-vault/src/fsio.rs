// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File plumbing for store artifacts: owner-only permissions, atomic
//! replacement, timestamped backups and the advisory store lock.
//!
//! Every write goes to a temp file created next to its target, is flushed
//! and size-checked, and only then renamed over the canonical path. A failure
//! at any point before the rename leaves the target untouched.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use keyenv_core::{KeyenvError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Mode for key, store and backup files.
pub const FILE_MODE: u32 = 0o600;

/// Mode for the store directory.
pub const DIR_MODE: u32 = 0o700;

/// How long to wait for a contended store lock before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_RETRY: Duration = Duration::from_millis(25);

/// Create `dir` (and parents) if needed and restrict it to the owner.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| KeyenvError::Persist {
            path: dir.to_path_buf(),
            source,
        })?;
        set_mode(dir, DIR_MODE).map_err(|source| KeyenvError::Permission {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!(dir = %dir.display(), "store directory created");
    }
    Ok(())
}

/// Apply `mode` to `path`. No-op on platforms without Unix permissions.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Permission bits of `path`, if it exists and the platform has them.
#[cfg(unix)]
pub fn mode_of(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
pub fn mode_of(_path: &Path) -> Option<u32> {
    None
}

/// Tighten an existing file to [`FILE_MODE`], logging instead of failing.
///
/// Used on reads, where a loose mode is worth a warning but not an outage.
pub fn tighten_or_warn(path: &Path) {
    match mode_of(path) {
        Some(mode) if mode & 0o077 != 0 => {
            let mode = format!("{mode:o}");
            match set_mode(path, FILE_MODE) {
                Ok(()) => warn!(path = %path.display(), %mode, "permissions too open, restricted to 600"),
                Err(e) => warn!(path = %path.display(), %mode, error = %e, "could not restrict permissions"),
            }
        }
        _ => {}
    }
}

/// Ciphertext or key bytes written to a temp file beside their target,
/// waiting to be renamed into place.
///
/// Dropping a `StagedFile` without calling [`StagedFile::commit`] deletes
/// the temp file and leaves the target as it was.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Rename over the target, replacing any existing file.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| KeyenvError::Persist {
                path: target.clone(),
                source: e.error,
            })?;
        sync_parent(&target);
        debug!(path = %target.display(), "file replaced atomically");
        Ok(())
    }

    /// Rename into place only if the target does not exist yet.
    ///
    /// Returns `false` (and discards the staged bytes) when it already does.
    pub fn commit_new(self) -> Result<bool> {
        let target = self.target;
        match self.tmp.persist_noclobber(&target) {
            Ok(_) => {
                sync_parent(&target);
                Ok(true)
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(KeyenvError::Persist {
                path: target,
                source: e.error,
            }),
        }
    }
}

/// Write `bytes` to an owner-only temp file in the target's directory.
///
/// The data is fsynced and its on-disk length checked against `bytes`
/// before the caller may commit it. Empty payloads are refused.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<StagedFile> {
    let persist_err = |source| KeyenvError::Persist {
        path: target.to_path_buf(),
        source,
    };
    if bytes.is_empty() {
        return Err(persist_err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "refusing to stage an empty payload",
        )));
    }

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".keyenv-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(persist_err)?;

    set_mode(tmp.path(), FILE_MODE).map_err(|source| KeyenvError::Permission {
        path: tmp.path().to_path_buf(),
        source,
    })?;
    tmp.write_all(bytes).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;

    let written = tmp.as_file().metadata().map_err(persist_err)?.len();
    if written != bytes.len() as u64 {
        return Err(persist_err(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            format!("staged {written} of {} bytes", bytes.len()),
        )));
    }

    Ok(StagedFile {
        tmp,
        target: target.to_path_buf(),
    })
}

/// Stage and commit in one step.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    stage(target, bytes)?.commit()
}

fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent()
        && let Ok(handle) = File::open(dir)
    {
        let _ = handle.sync_all();
    }
}

/// Compact UTC timestamp used as the backup suffix.
pub fn timestamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string()
}

/// First free `<file>.<stamp>[.<n>].bak` path beside `path`.
pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidate = |n: u32| {
        let file = if n == 0 {
            format!("{name}.{stamp}.bak")
        } else {
            format!("{name}.{stamp}.{n}.bak")
        };
        path.with_file_name(file)
    };
    (0..)
        .map(candidate)
        .find(|p| !p.exists())
        .unwrap_or_else(|| candidate(u32::MAX))
}

/// Copy `path` to a timestamped, owner-only backup.
///
/// Returns `None` when there is nothing to back up. Backups are never
/// deleted by keyenv.
pub fn backup_copy(path: &Path, stamp: &str) -> Result<Option<PathBuf>> {
    let bytes = match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(KeyenvError::Persist {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let dest = backup_path(path, stamp);
    stage(&dest, &bytes)?.commit_new()?;
    debug!(from = %path.display(), to = %dest.display(), "backup written");
    Ok(Some(dest))
}

/// How the store lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Read-only operations; many may hold it at once.
    Shared,
    /// Load-mutate-persist cycles.
    Exclusive,
}

/// An advisory `flock` on the store's lock file, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    #[allow(dead_code)] // held for its descriptor
    file: File,
    mode: LockMode,
}

impl StoreLock {
    /// Take the lock, retrying until [`LOCK_TIMEOUT`] elapses.
    ///
    /// Creates the lock file if needed. A shared lock on an existing lock
    /// file only needs read access.
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self> {
        let file = open_lock_file(path, mode)
            .map_err(|e| KeyenvError::Lock(format!("cannot open {}: {e}", path.display())))?;

        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match try_flock(&file, mode) {
                Ok(()) => {
                    debug!(?mode, path = %path.display(), "store lock acquired");
                    return Ok(Self { file, mode });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(KeyenvError::Lock(format!(
                            "{} is held by another keyenv process",
                            path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => {
                    return Err(KeyenvError::Lock(format!(
                        "flock on {} failed: {e}",
                        path.display()
                    )));
                }
            }
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

fn open_lock_file(path: &Path, mode: LockMode) -> std::io::Result<File> {
    if mode == LockMode::Shared && path.exists() {
        return File::open(path);
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    let _ = set_mode(path, FILE_MODE);
    Ok(file)
}

#[cfg(unix)]
fn try_flock(file: &File, mode: LockMode) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let op = match mode {
        LockMode::Shared => libc::LOCK_SH,
        LockMode::Exclusive => libc::LOCK_EX,
    };
    // SAFETY: the descriptor is owned by `file` and valid for this call.
    let ret = unsafe { libc::flock(file.as_raw_fd(), op | libc::LOCK_NB) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_flock(_file: &File, _mode: LockMode) -> std::io::Result<()> {
    Ok(())
}
