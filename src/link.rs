//! Exposing entry points through the shared bin directory.
//!
//! Every entry point becomes a relative symlink `<bin_dir>/<name>` pointing into the
//! package environment. Links that already point into the same environment are
//! considered ours and get replaced; anything else in the way is a conflict.

use anyhow::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::descriptor::EntryPoint;
use crate::environment::Environment;
use crate::error::InstallError;
use crate::receipt::LinkRecord;
use crate::rollback::RollbackJournal;
use crate::runtime::{Runtime, is_path_under, relative_symlink_path};

/// Status of a symlink check.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkStatus {
    /// Link exists and points under the expected prefix
    Valid,
    /// Nothing exists at the link location
    NotExists,
    /// Link exists but points to a different location
    WrongTarget(PathBuf),
    /// Path exists but is not a symlink
    NotSymlink,
    /// Cannot resolve the symlink target
    Unresolvable,
}

impl LinkStatus {
    pub fn reason(&self) -> String {
        match self {
            LinkStatus::Valid => "valid".to_string(),
            LinkStatus::NotExists => "does not exist".to_string(),
            LinkStatus::WrongTarget(target) => format!(
                "a symlink to {:?} is in the way; it is not managed by this package",
                target
            ),
            LinkStatus::NotSymlink => "a file that is not a symlink is in the way".to_string(),
            LinkStatus::Unresolvable => "cannot resolve the existing symlink".to_string(),
        }
    }
}

/// Link manager for one package environment.
pub struct LinkManager<'a, R: Runtime> {
    runtime: &'a R,
    bin_dir: &'a Path,
    environment: &'a Environment,
}

impl<'a, R: Runtime> LinkManager<'a, R> {
    pub fn new(runtime: &'a R, bin_dir: &'a Path, environment: &'a Environment) -> Self {
        Self {
            runtime,
            bin_dir,
            environment,
        }
    }

    pub fn link_path(&self, link_name: &str) -> PathBuf {
        self.bin_dir.join(link_name)
    }

    /// Check whether the symlink at `dest` points into this environment.
    pub fn check_link(&self, dest: &Path) -> LinkStatus {
        if self.runtime.is_symlink(dest) {
            match self.runtime.resolve_link(dest) {
                Ok(target) if is_path_under(&target, &self.environment.prefix) => LinkStatus::Valid,
                Ok(target) => LinkStatus::WrongTarget(target),
                Err(_) => LinkStatus::Unresolvable,
            }
        } else if self.runtime.exists(dest) {
            LinkStatus::NotSymlink
        } else {
            LinkStatus::NotExists
        }
    }

    /// Whether every recorded link still points into the environment.
    pub fn all_valid(&self, links: &[LinkRecord]) -> bool {
        links
            .iter()
            .all(|record| self.check_link(&record.link) == LinkStatus::Valid)
    }

    /// Create one link per entry point, recording each change in `journal`.
    #[tracing::instrument(skip(self, entry_points, journal))]
    pub fn expose(
        &self,
        entry_points: &[EntryPoint],
        journal: &mut RollbackJournal,
    ) -> Result<Vec<LinkRecord>, InstallError> {
        if !self.runtime.exists(self.bin_dir) {
            self.runtime.create_dir_all(self.bin_dir)?;
            journal.created_shared_dir(self.bin_dir.to_path_buf());
        }

        let mut records = Vec::with_capacity(entry_points.len());
        for entry in entry_points {
            records.push(self.expose_one(entry, journal)?);
        }
        Ok(records)
    }

    fn expose_one(
        &self,
        entry: &EntryPoint,
        journal: &mut RollbackJournal,
    ) -> Result<LinkRecord, InstallError> {
        let link_error = |reason: String| InstallError::Link {
            entry_point: entry.link_name.clone(),
            reason,
        };

        let target = self.environment.prefix.join(&entry.path);
        if !self.runtime.exists(&target) {
            return Err(link_error(format!(
                "{} was not installed into {:?}",
                entry.path.display(),
                self.environment.prefix
            )));
        }
        if !self.runtime.is_executable(&target) {
            return Err(link_error(format!("{:?} is not executable", target)));
        }

        let dest = self.link_path(&entry.link_name);
        match self.check_link(&dest) {
            LinkStatus::NotExists => {}
            LinkStatus::Valid => {
                let previous = self.runtime.read_link(&dest)?;
                debug!("Replacing {:?} -> {:?}", dest, previous);
                self.runtime.remove_symlink(&dest)?;
                journal.unlinked(dest.clone(), previous);
            }
            status => return Err(link_error(format!("{:?}: {}", dest, status.reason()))),
        }

        let link_target = relative_symlink_path(&dest, &target).unwrap_or_else(|| target.clone());
        self.runtime.symlink(&link_target, &dest)?;
        journal.linked(dest.clone());
        info!("Linked {:?} -> {:?}", dest, link_target);

        Ok(LinkRecord {
            name: entry.link_name.clone(),
            target: entry.path.clone(),
            link: dest,
        })
    }

    /// Remove links from a previous installation that the new one no longer exposes.
    pub fn remove_stale(
        &self,
        previous: &[LinkRecord],
        current: &[LinkRecord],
        journal: &mut RollbackJournal,
    ) -> Result<()> {
        for record in previous {
            if current.iter().any(|c| c.link == record.link) {
                continue;
            }
            if self.check_link(&record.link) != LinkStatus::Valid {
                continue;
            }
            let target = self.runtime.read_link(&record.link)?;
            self.runtime.remove_symlink(&record.link)?;
            journal.unlinked(record.link.clone(), target);
            debug!("Removed stale link {:?}", record.link);
        }
        Ok(())
    }

    /// Remove recorded links that still point into the environment.
    /// Returns the number of links removed.
    pub fn unexpose(&self, links: &[LinkRecord]) -> Result<usize> {
        let mut removed = 0;
        for record in links {
            if self
                .runtime
                .remove_symlink_if_target_under(&record.link, &self.environment.prefix)?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use std::fs;
    use tempfile::tempdir;

    fn entry(name: &str) -> EntryPoint {
        EntryPoint::parse(name).unwrap()
    }

    #[cfg(unix)]
    fn install_executable(env: &Environment, rel: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = env.prefix.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "#!/bin/sh\necho demo\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_check_link_statuses() {
        let env = Environment::new(Path::new("/opt/isopkg"), "demo");
        let bin = PathBuf::from("/opt/isopkg/bin");
        let mut runtime = MockRuntime::new();

        runtime
            .expect_is_symlink()
            .returning(|p| !p.ends_with("plain") && !p.ends_with("absent"));
        runtime.expect_resolve_link().returning(|p| {
            if p.ends_with("ours") {
                Ok(PathBuf::from("/opt/isopkg/demo/bin/ours"))
            } else {
                Ok(PathBuf::from("/usr/lib/other/bin/theirs"))
            }
        });
        runtime.expect_exists().returning(|p| p.ends_with("plain"));

        let manager = LinkManager::new(&runtime, &bin, &env);
        assert_eq!(manager.check_link(&bin.join("ours")), LinkStatus::Valid);
        assert!(matches!(
            manager.check_link(&bin.join("theirs")),
            LinkStatus::WrongTarget(_)
        ));
        assert_eq!(manager.check_link(&bin.join("plain")), LinkStatus::NotSymlink);
        assert_eq!(manager.check_link(&bin.join("absent")), LinkStatus::NotExists);
    }

    #[test]
    #[cfg(unix)]
    fn test_expose_creates_relative_links() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let env = Environment::new(root, "demo");
        let bin = root.join("bin");
        install_executable(&env, "bin/demo");

        let manager = LinkManager::new(&RealRuntime, &bin, &env);
        let mut journal = RollbackJournal::new();
        let records = manager.expose(&[entry("demo")], &mut journal).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].link, bin.join("demo"));
        assert_eq!(
            fs::read_link(bin.join("demo")).unwrap(),
            PathBuf::from("../demo/bin/demo")
        );
        assert!(manager.all_valid(&records));
    }

    #[test]
    #[cfg(unix)]
    fn test_rollback_keeps_new_bin_dir_used_by_others() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let env = Environment::new(root, "demo");
        let bin = root.join("bin");
        install_executable(&env, "bin/demo");

        let manager = LinkManager::new(&RealRuntime, &bin, &env);
        let mut journal = RollbackJournal::new();
        manager.expose(&[entry("demo")], &mut journal).unwrap();
        std::os::unix::fs::symlink("../other/bin/other", bin.join("other")).unwrap();

        journal.rollback(&RealRuntime).unwrap();
        assert!(fs::symlink_metadata(bin.join("demo")).is_err());
        assert!(fs::symlink_metadata(bin.join("other")).is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_expose_replaces_own_link_and_rollback_restores_it() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let env = Environment::new(root, "demo");
        let bin = root.join("bin");
        install_executable(&env, "bin/demo");
        fs::create_dir_all(&bin).unwrap();
        std::os::unix::fs::symlink("../demo/bin/old-demo", bin.join("demo")).unwrap();

        let manager = LinkManager::new(&RealRuntime, &bin, &env);
        let mut journal = RollbackJournal::new();
        manager.expose(&[entry("demo")], &mut journal).unwrap();
        assert_eq!(
            fs::read_link(bin.join("demo")).unwrap(),
            PathBuf::from("../demo/bin/demo")
        );

        journal.rollback(&RealRuntime).unwrap();
        assert_eq!(
            fs::read_link(bin.join("demo")).unwrap(),
            PathBuf::from("../demo/bin/old-demo")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_expose_refuses_foreign_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let env = Environment::new(root, "demo");
        let bin = root.join("bin");
        install_executable(&env, "bin/demo");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("demo"), "somebody else's script").unwrap();

        let manager = LinkManager::new(&RealRuntime, &bin, &env);
        let err = manager
            .expose(&[entry("demo")], &mut RollbackJournal::new())
            .unwrap_err();
        assert!(matches!(err, InstallError::Link { .. }));
        assert!(err.to_string().contains("not a symlink"));
        assert_eq!(
            fs::read_to_string(bin.join("demo")).unwrap(),
            "somebody else's script"
        );
    }

    #[test]
    fn test_expose_missing_entry_point() {
        let dir = tempdir().unwrap();
        let env = Environment::new(dir.path(), "demo");
        fs::create_dir_all(&env.prefix).unwrap();
        let bin = dir.path().join("bin");

        let manager = LinkManager::new(&RealRuntime, &bin, &env);
        let err = manager
            .expose(&[entry("demo")], &mut RollbackJournal::new())
            .unwrap_err();
        match err {
            InstallError::Link { entry_point, reason } => {
                assert_eq!(entry_point, "demo");
                assert!(reason.contains("was not installed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_remove_stale_and_unexpose() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let env = Environment::new(root, "demo");
        let bin = root.join("bin");
        install_executable(&env, "bin/demo");
        install_executable(&env, "bin/demo-legacy");

        let manager = LinkManager::new(&RealRuntime, &bin, &env);
        let mut journal = RollbackJournal::new();
        let old = manager
            .expose(&[entry("demo"), entry("demo-legacy")], &mut journal)
            .unwrap();
        let new = manager.expose(&[entry("demo")], &mut journal).unwrap();

        manager.remove_stale(&old, &new, &mut journal).unwrap();
        assert!(fs::symlink_metadata(bin.join("demo-legacy")).is_err());
        assert!(bin.join("demo").exists());

        assert_eq!(manager.unexpose(&new).unwrap(), 1);
        assert!(fs::symlink_metadata(bin.join("demo")).is_err());
    }
}
