// pgbackuptool/src/utils/lock.rs
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::errors::{AppError, Result};

pub const LOCK_FILE_NAME: &str = ".pgbackuptool.lock";
const STALE_LOCK_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Exclusive marker file preventing overlapping backup runs on one backup directory.
/// Removed when dropped.
#[derive(Debug)]
pub struct BackupLock {
    path: PathBuf,
}

impl BackupLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(AppError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                let taken = if is_stale(&path) {
                    Self::take_over_stale(&path)?
                } else {
                    None
                };
                taken.ok_or_else(|| AppError::Locked(path.display().to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        debug!("Acquired lock {}", path.display());
        Ok(BackupLock {
            path: path.to_path_buf(),
        })
    }

    /// Replaces a stale lock while holding `<lock>.takeover`. Staleness is re-checked under
    /// the guard so a lock another run has just created is never removed.
    fn take_over_stale(path: &Path) -> Result<Option<Self>> {
        let guard = path.with_file_name(format!("{}.takeover", LOCK_FILE_NAME));
        match OpenOptions::new().write(true).create_new(true).open(&guard) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if is_stale(&guard) {
                    warn!("⚠️ Removing abandoned takeover guard {}", guard.display());
                    fs::remove_file(&guard)?;
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let taken = if is_stale(path) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    let _ = fs::remove_file(&guard);
                    return Err(e.into());
                }
            }
            warn!("⚠️ Replacing stale lock file {}", path.display());
            Self::create(path).ok()
        } else {
            None
        };

        if let Err(e) = fs::remove_file(&guard) {
            warn!("⚠️ Failed to remove takeover guard {}: {}", guard.display(), e);
        }
        Ok(taken)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BackupLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("⚠️ Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}
