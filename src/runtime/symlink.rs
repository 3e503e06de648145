//! Symlink operations (create, read, resolve, remove).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::RealRuntime;
use super::path::{is_path_under, normalize_path};

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn symlink_impl(&self, original: &Path, link: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::symlink as unix_symlink;
            unix_symlink(original, link)
                .with_context(|| format!("Failed to create symlink {:?} -> {:?}", link, original))?;
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::{symlink_dir, symlink_file};

            // `is_dir()` on a relative path is relative to CWD; we want it relative to the link's parent.
            let target_path = if original.is_absolute() {
                original.to_path_buf()
            } else {
                link.parent()
                    .context("Failed to get parent directory for symlink")?
                    .join(original)
            };

            if target_path.is_dir() {
                symlink_dir(original, link).context("Failed to create directory symlink")?;
            } else {
                symlink_file(original, link).context("Failed to create file symlink")?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_link_impl(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).with_context(|| format!("Failed to read symlink {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn resolve_link_impl(&self, path: &Path) -> Result<PathBuf> {
        let target = self.read_link_impl(path)?;
        if target.is_absolute() {
            return Ok(target);
        }
        let parent = path
            .parent()
            .context("Failed to get parent directory of symlink")?;
        Ok(normalize_path(&parent.join(&target)))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_symlink_impl(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_symlink_impl(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            fs::remove_file(path).with_context(|| format!("Failed to remove symlink {:?}", path))?;
        }
        #[cfg(windows)]
        {
            // Directory symlinks need remove_dir, file symlinks need remove_file.
            fs::remove_dir(path)
                .or_else(|_| fs::remove_file(path))
                .with_context(|| format!("Failed to remove symlink {:?}", path))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_symlink_if_target_under_impl(
        &self,
        link_path: &Path,
        target_prefix: &Path,
    ) -> Result<bool> {
        if !self.is_symlink_impl(link_path) {
            if self.exists_impl(link_path) {
                warn!("{:?} exists but is not a symlink, leaving it alone", link_path);
            } else {
                debug!("{:?} does not exist, nothing to remove", link_path);
            }
            return Ok(false);
        }

        let resolved = match self.resolve_link_impl(link_path) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Cannot read target of {:?}: {}", link_path, e);
                return Ok(false);
            }
        };

        // The link may dangle (environment already gone), so compare lexically as
        // well as canonically.
        let lexical_match = is_path_under(&resolved, target_prefix);
        let canonical_match = match (fs::canonicalize(&resolved), fs::canonicalize(target_prefix)) {
            (Ok(target), Ok(prefix)) => is_path_under(&target, &prefix),
            _ => false,
        };

        if !lexical_match && !canonical_match {
            debug!(
                "{:?} points to {:?} which is not within {:?}, skipping removal",
                link_path, resolved, target_prefix
            );
            return Ok(false);
        }

        debug!("Removing symlink {:?} -> {:?}", link_path, resolved);
        self.remove_symlink_impl(link_path)?;
        Ok(true)
    }
}
