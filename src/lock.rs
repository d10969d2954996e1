// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::fs::create_private_dir;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock on a CA tree.
/// The lock is released when this struct is dropped.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Take the lock at `path` without waiting.
    /// Fails with [`Error::Locked`] if another run holds it.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| Error::ArtifactWrite {
                path: path.to_path_buf(),
                source: e,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "acquired lock");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(Error::Locked(path.to_path_buf()))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(Error::Locked(path.to_path_buf()))
            }
            Err(e) => Err(Error::ArtifactWrite {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // The OS drops the lock with the descriptor; unlock early anyway
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "released lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("Crtforge").join(".lock");

        let held = StoreLock::try_acquire(&path).expect("first lock should succeed");
        assert_eq!(held.path(), path);

        match StoreLock::try_acquire(&path) {
            Err(Error::Locked(p)) => assert_eq!(p, path),
            other => panic!("expected Locked, got {:?}", other),
        }

        drop(held);
        StoreLock::try_acquire(&path).expect("lock should be free after drop");
    }
}
