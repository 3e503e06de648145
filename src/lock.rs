//! Per-package install lock.
//!
//! `<root>/.<name>.lock` is held exclusively while a package's environment or links
//! are being changed, so two installs of the same package cannot interleave.
//! The file itself is never deleted: every process must lock the same inode, and
//! the kernel drops the lock when the holder exits.

use anyhow::Context;
use fs2::FileExt;
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::InstallError;

pub fn lock_path(install_root: &Path, name: &str) -> PathBuf {
    install_root.join(format!(".{}.lock", name))
}

/// Take the exclusive lock for `name` without waiting.
#[tracing::instrument]
pub fn acquire_package_lock(install_root: &Path, name: &str) -> Result<PackageLock, InstallError> {
    let path = lock_path(install_root, name);

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("Failed to create lock file {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        return Err(InstallError::Lock(format!(
            "package '{}' is being modified by another isopkg process (lock {})",
            name,
            path.display()
        )));
    }

    debug!("Acquired {}", path.display());
    Ok(PackageLock { file, path })
}

/// RAII guard: releases the lock when dropped. The lock file stays in place.
#[derive(Debug)]
pub struct PackageLock {
    file: File,
    path: PathBuf,
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released {}", self.path.display());
    }
}
