use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// An exclusive advisory hold on a store, released on drop.
///
/// On-disk stores use a sibling lock file created with `create_new`, so a
/// second pass against the same path fails fast instead of waiting.
/// In-memory stores use a shared flag.
#[derive(Debug)]
pub struct StoreHold {
    kind: HoldKind,
}

#[derive(Debug)]
enum HoldKind {
    File(PathBuf),
    Flag(Arc<AtomicBool>),
}

impl StoreHold {
    /// Acquire the lock file that guards `store_path`.
    pub fn lock_file(store_path: &Path) -> Result<Self> {
        let lock_path = lock_path_for(store_path);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::StoreLocked { path: lock_path });
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "pid={}", std::process::id())?;
        log::debug!("Acquired store hold {}", lock_path.display());
        Ok(Self {
            kind: HoldKind::File(lock_path),
        })
    }

    /// Acquire an in-process hold guarded by `flag`.
    pub fn flag(flag: &Arc<AtomicBool>, name: &str) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::StoreLocked {
                path: PathBuf::from(name),
            });
        }
        Ok(Self {
            kind: HoldKind::Flag(Arc::clone(flag)),
        })
    }
}

impl Drop for StoreHold {
    fn drop(&mut self) {
        match &self.kind {
            HoldKind::File(path) => {
                if let Err(e) = std::fs::remove_file(path) {
                    log::warn!("Failed to release store hold {}: {}", path.display(), e);
                } else {
                    log::debug!("Released store hold {}", path.display());
                }
            }
            HoldKind::Flag(flag) => flag.store(false, Ordering::Release),
        }
    }
}

/// `<store>.lock` next to the store file.
#[must_use]
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
