//! Cross-process build lock keyed by environment location.
//!
//! The lock file sits next to the environment (`<root>/<name>.lock`), not
//! inside it, so destroying the environment never drops the lock.
//! Mutual exclusion uses an advisory exclusive file lock (flock / LockFileEx);
//! the lock is released when the guard is dropped, including on panic or
//! process exit.

use fs2::FileExt;
use spycery_core::config::LockMode;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll interval while waiting for another builder.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {} is held by another process (waited {}ms)", path.display(), waited.as_millis())]
    Busy { path: PathBuf, waited: Duration },

    #[error("failed to open lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Lock file path for the environment at `location`.
pub fn lock_path_for(location: &Path) -> PathBuf {
    let mut name = location
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "env".into());
    name.push(".lock");
    location.with_file_name(name)
}

/// RAII guard for an exclusively held build lock.
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Try once. `Ok(None)` means another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Acquire according to `mode`: `Block` polls until `timeout`, `FailFast`
    /// returns `Busy` on the first contended attempt.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self, LockError> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            let waited = start.elapsed();
            if mode == LockMode::FailFast || waited >= timeout {
                return Err(LockError::Busy {
                    path: path.to_path_buf(),
                    waited,
                });
            }
            tracing::debug!(lock = %path.display(), "waiting for concurrent build to finish");
            thread::sleep(LOCK_POLL_INTERVAL.min(timeout.saturating_sub(waited)));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(e: &io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    e.kind() == io::ErrorKind::WouldBlock
        || (e.raw_os_error().is_some() && e.raw_os_error() == contended.raw_os_error())
}
