//! Rollback journal for the mutating part of an install.
//!
//! Every change made under the install root or in the bin directory is recorded as
//! it happens. On failure the journal is replayed backwards, which removes what the
//! install created and puts back what it moved aside. On success the backups are
//! discarded.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// A file or directory that did not exist before.
    Created(PathBuf),
    /// A directory shared with other packages that did not exist before.
    /// Removed on rollback only while it is still empty.
    SharedDir(PathBuf),
    /// A symlink that did not exist before.
    Linked(PathBuf),
    /// An existing path renamed to `backup`.
    MovedAside { original: PathBuf, backup: PathBuf },
    /// A symlink that was removed; recreated with `target` on rollback.
    Unlinked { link: PathBuf, target: PathBuf },
}

#[derive(Debug, Default)]
pub struct RollbackJournal {
    #[cfg(test)]
    pub entries: Vec<JournalEntry>,
    #[cfg(not(test))]
    entries: Vec<JournalEntry>,
}

impl RollbackJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&mut self, path: PathBuf) {
        self.entries.push(JournalEntry::Created(path));
    }

    pub fn created_shared_dir(&mut self, path: PathBuf) {
        self.entries.push(JournalEntry::SharedDir(path));
    }

    pub fn linked(&mut self, link: PathBuf) {
        self.entries.push(JournalEntry::Linked(link));
    }

    pub fn unlinked(&mut self, link: PathBuf, target: PathBuf) {
        self.entries.push(JournalEntry::Unlinked { link, target });
    }

    /// Rename `original` to `backup` and record it.
    pub fn move_aside<R: Runtime>(&mut self, runtime: &R, original: &Path, backup: &Path) -> Result<()> {
        if runtime.exists(backup) || runtime.is_symlink(backup) {
            remove_path(runtime, backup)
                .with_context(|| format!("Failed to clear stale backup {:?}", backup))?;
        }
        runtime
            .rename(original, backup)
            .with_context(|| format!("Failed to move {:?} aside", original))?;
        self.entries.push(JournalEntry::MovedAside {
            original: original.to_path_buf(),
            backup: backup.to_path_buf(),
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Undo every recorded change, newest first. Failures are logged and the replay
    /// continues; the first failure is returned once everything was attempted.
    #[tracing::instrument(skip(self, runtime))]
    pub fn rollback<R: Runtime>(self, runtime: &R) -> Result<()> {
        let mut first_error = None;
        for entry in self.entries.into_iter().rev() {
            debug!("Rolling back {:?}", entry);
            let result = match &entry {
                JournalEntry::Created(path) => remove_path(runtime, path),
                JournalEntry::SharedDir(path) => remove_if_empty(runtime, path),
                JournalEntry::Linked(link) => {
                    if runtime.is_symlink(link) {
                        runtime.remove_symlink(link)
                    } else {
                        Ok(())
                    }
                }
                JournalEntry::MovedAside { original, backup } => {
                    restore_backup(runtime, original, backup)
                }
                JournalEntry::Unlinked { link, target } => {
                    if runtime.is_symlink(link) || runtime.exists(link) {
                        Ok(())
                    } else {
                        runtime.symlink(target, link)
                    }
                }
            };
            if let Err(e) = result {
                warn!("Rollback of {:?} failed: {:#}", entry, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.context("Rollback was incomplete")),
            None => Ok(()),
        }
    }

    /// Keep the changes and discard the backups.
    #[tracing::instrument(skip(self, runtime))]
    pub fn commit<R: Runtime>(self, runtime: &R) {
        for entry in self.entries {
            if let JournalEntry::MovedAside { backup, .. } = entry
                && let Err(e) = remove_path(runtime, &backup)
            {
                warn!("Failed to remove backup {:?}: {:#}", backup, e);
            }
        }
    }
}

fn restore_backup<R: Runtime>(runtime: &R, original: &Path, backup: &Path) -> Result<()> {
    if runtime.exists(original) || runtime.is_symlink(original) {
        remove_path(runtime, original)?;
    }
    runtime.rename(backup, original)
}

fn remove_if_empty<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    if !runtime.is_dir(path) {
        return Ok(());
    }
    if !runtime.read_dir(path)?.is_empty() {
        debug!("Keeping {:?}: no longer empty", path);
        return Ok(());
    }
    runtime.remove_dir(path)
}

fn remove_path<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    if runtime.is_symlink(path) {
        runtime.remove_symlink(path)
    } else if runtime.is_dir(path) {
        runtime.remove_dir_all(path)
    } else if runtime.exists(path) {
        runtime.remove_file(path)
    } else {
        Ok(())
    }
}

/// Flag raised by the Ctrl-C listener while an install is mutating the root.
#[derive(Debug, Clone, Default)]
pub struct Interruption(Arc<AtomicBool>);

impl Interruption {
    /// Listen for Ctrl-C until the returned guard is dropped.
    ///
    /// Yields once so the handler is registered before the caller starts blocking work.
    pub async fn listen(&self) -> InterruptionGuard {
        let flag = Arc::clone(&self.0);
        let handle = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, rolling back...");
                flag.store(true, Ordering::SeqCst);
            }
        });
        tokio::task::yield_now().await;
        InterruptionGuard(handle)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Stops the Ctrl-C listener when dropped.
pub struct InterruptionGuard(tokio::task::JoinHandle<()>);

impl Drop for InterruptionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_rollback_removes_created_paths() {
        let dir = tempdir().unwrap();
        let env_dir = dir.path().join("demo");
        fs::create_dir_all(env_dir.join("bin")).unwrap();
        fs::write(env_dir.join("bin/demo"), "#!/bin/sh").unwrap();

        let mut journal = RollbackJournal::new();
        journal.created(env_dir.clone());
        journal.rollback(&RealRuntime).unwrap();

        assert!(!env_dir.exists());
    }

    #[test_log::test]
    #[cfg(unix)]
    fn test_rollback_keeps_shared_dir_with_foreign_entries() {
        let dir = tempdir().unwrap();
        let shared = dir.path().join("bin");
        let empty = dir.path().join("empty-bin");

        let mut journal = RollbackJournal::new();
        fs::create_dir(&shared).unwrap();
        journal.created_shared_dir(shared.clone());
        fs::create_dir(&empty).unwrap();
        journal.created_shared_dir(empty.clone());
        fs::write(shared.join("demo"), "#!/bin/sh").unwrap();
        journal.created(shared.join("demo"));
        // Another package linked into the directory meanwhile
        std::os::unix::fs::symlink("../other/bin/other", shared.join("other")).unwrap();

        journal.rollback(&RealRuntime).unwrap();
        assert!(!shared.join("demo").exists());
        assert!(fs::symlink_metadata(shared.join("other")).is_ok());
        assert!(!empty.exists());
    }

    #[test]
    fn test_rollback_restores_moved_aside_environment() {
        let dir = tempdir().unwrap();
        let env_dir = dir.path().join("demo");
        let backup = dir.path().join(".demo.backup");
        fs::create_dir(&env_dir).unwrap();
        fs::write(env_dir.join("receipt.json"), "old").unwrap();

        let mut journal = RollbackJournal::new();
        journal.move_aside(&RealRuntime, &env_dir, &backup).unwrap();
        assert!(!env_dir.exists());

        // The failed install left a half-built environment behind
        fs::create_dir(&env_dir).unwrap();
        journal.created(env_dir.clone());
        fs::write(env_dir.join("partial"), "new").unwrap();

        journal.rollback(&RealRuntime).unwrap();
        assert_eq!(fs::read_to_string(env_dir.join("receipt.json")).unwrap(), "old");
        assert!(!env_dir.join("partial").exists());
        assert!(!backup.exists());
    }

    #[test]
    fn test_commit_discards_backups() {
        let dir = tempdir().unwrap();
        let env_dir = dir.path().join("demo");
        let backup = dir.path().join(".demo.backup");
        fs::create_dir(&env_dir).unwrap();

        let mut journal = RollbackJournal::new();
        journal.move_aside(&RealRuntime, &env_dir, &backup).unwrap();
        fs::create_dir(&env_dir).unwrap();
        journal.created(env_dir.clone());

        journal.commit(&RealRuntime);
        assert!(env_dir.exists());
        assert!(!backup.exists());
    }

    #[test]
    fn test_move_aside_replaces_stale_backup() {
        let dir = tempdir().unwrap();
        let env_dir = dir.path().join("demo");
        let backup = dir.path().join(".demo.backup");
        fs::create_dir(&env_dir).unwrap();
        fs::write(env_dir.join("marker"), "current").unwrap();
        fs::create_dir(&backup).unwrap();
        fs::write(backup.join("marker"), "stale").unwrap();

        let mut journal = RollbackJournal::new();
        journal.move_aside(&RealRuntime, &env_dir, &backup).unwrap();
        assert_eq!(fs::read_to_string(backup.join("marker")).unwrap(), "current");
        assert_eq!(journal.entries.len(), 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_rollback_relinks_and_unlinks() {
        let dir = tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        let new_link = bin.join("demo");
        let old_link = bin.join("demo-old");
        std::os::unix::fs::symlink("../demo/bin/demo", &new_link).unwrap();

        let mut journal = RollbackJournal::new();
        journal.unlinked(old_link.clone(), PathBuf::from("../demo/bin/demo-old"));
        journal.linked(new_link.clone());
        journal.rollback(&RealRuntime).unwrap();

        assert!(fs::symlink_metadata(&new_link).is_err());
        assert_eq!(
            fs::read_link(&old_link).unwrap(),
            PathBuf::from("../demo/bin/demo-old")
        );
    }

    #[test_log::test]
    fn test_rollback_continues_after_failure() {
        let dir = tempdir().unwrap();
        let created = dir.path().join("created");
        fs::create_dir(&created).unwrap();

        let mut journal = RollbackJournal::new();
        journal.created(created.clone());
        journal.entries.push(JournalEntry::MovedAside {
            original: dir.path().join("demo"),
            backup: dir.path().join("missing-backup"),
        });

        let err = journal.rollback(&RealRuntime).unwrap_err();
        assert!(err.to_string().contains("incomplete"));
        assert!(!created.exists());
    }

    #[tokio::test]
    async fn test_interruption_flag() {
        let interruption = Interruption::default();
        let guard = interruption.listen().await;
        assert!(!interruption.is_raised());
        interruption.raise();
        assert!(interruption.clone().is_raised());
        drop(guard);
    }
}
