//! The install procedure and the operations on installed packages.
//!
//! `install` runs fetch, verify and dependency provisioning against a private
//! staging directory first. Only then is the package lock taken and the install root
//! touched: environment creation, install steps, linking and the smoke test form one
//! unit that is rolled back as a whole when any of them fails.

use anyhow::Context;
use log::{debug, info, warn};
use std::ffi::OsString;
use std::path::Path;

use crate::archive::ArchiveExtractor;
use crate::config::Config;
use crate::deps::{DependencyProvider, Provisioned, augmented_path, provision};
use crate::descriptor::{EntryPoint, PackageDescriptor, validate_name};
use crate::digest::{Verification, verify_sha256};
use crate::environment::{Environment, StepContext, run_install_steps};
use crate::error::{InstallError, Result};
use crate::fetch::Fetcher;
use crate::link::LinkManager;
use crate::lock::acquire_package_lock;
use crate::receipt::{Receipt, find_installed};
use crate::rollback::{Interruption, RollbackJournal};
use crate::runtime::{CommandOutput, Runtime};
use crate::smoke::run_smoke_test;

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Replace an identical existing installation instead of keeping it.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    Installed(Receipt),
    /// The same name, version and digest is already installed with intact links.
    AlreadyInstalled(Receipt),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UninstallOutcome {
    Removed { links: usize },
    Cancelled,
}

pub struct Installer<R: Runtime, F: Fetcher, D: DependencyProvider, E: ArchiveExtractor> {
    pub runtime: R,
    pub fetcher: F,
    pub provider: D,
    pub extractor: E,
    pub config: Config,
}

impl<R, F, D, E> Installer<R, F, D, E>
where
    R: Runtime + 'static,
    F: Fetcher,
    D: DependencyProvider,
    E: ArchiveExtractor,
{
    pub fn new(runtime: R, fetcher: F, provider: D, extractor: E, config: Config) -> Self {
        Self {
            runtime,
            fetcher,
            provider,
            extractor,
            config,
        }
    }

    fn environment(&self, name: &str) -> Environment {
        Environment::new(&self.config.install_root, name)
    }

    fn link_manager<'a>(&'a self, env: &'a Environment) -> LinkManager<'a, R> {
        LinkManager::new(&self.runtime, &self.config.bin_dir, env)
    }

    /// Receipt of the current installation; unreadable receipts count as absent.
    fn current_receipt(&self, env: &Environment) -> Option<Receipt> {
        match Receipt::load_from(&self.runtime, &env.prefix) {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Ignoring unreadable receipt of {}: {:#}", env.name, e);
                None
            }
        }
    }

    fn current_path(&self) -> Option<OsString> {
        self.runtime.env_var("PATH").ok().map(OsString::from)
    }

    #[tracing::instrument(skip(self, descriptor), fields(package = %descriptor.name, version = %descriptor.version))]
    pub async fn install(
        &self,
        descriptor: &PackageDescriptor,
        options: InstallOptions,
    ) -> Result<InstallOutcome> {
        descriptor.validate().map_err(InstallError::Descriptor)?;
        let entry_points = descriptor.entry_points().map_err(InstallError::Descriptor)?;
        let env = self.environment(&descriptor.name);

        if !options.force
            && let Some(receipt) = self.current_receipt(&env)
            && self.is_intact(&receipt, descriptor, &env)
        {
            info!(
                "{} {} is already installed",
                descriptor.name, descriptor.version
            );
            return Ok(InstallOutcome::AlreadyInstalled(receipt));
        }

        // Staged outside the root: nothing under it changes before the digest matched.
        let staging = tempfile::Builder::new()
            .prefix("isopkg-")
            .tempdir()
            .context("Failed to create a staging directory")?;
        let archive = staging.path().join(descriptor.archive_file_name());

        println!("   fetching {}", descriptor.url);
        self.fetcher
            .fetch(&descriptor.url, &archive)
            .await
            .map_err(|source| InstallError::Fetch {
                url: descriptor.url.clone(),
                source,
            })?;

        match verify_sha256(&self.runtime, &archive, &descriptor.sha256)? {
            Verification::Match => debug!("sha256 verified for {:?}", archive),
            Verification::Mismatch { expected, actual } => {
                return Err(InstallError::Integrity {
                    url: descriptor.url.clone(),
                    expected,
                    actual,
                });
            }
        }

        let provisioned = provision(&self.provider, descriptor)?;

        let source_dir = staging.path().join("source");
        self.unpack(&archive, &source_dir)?;

        self.runtime.create_dir_all(&self.config.install_root)?;
        let _lock = acquire_package_lock(&self.config.install_root, &descriptor.name)?;

        let interruption = Interruption::default();
        let _listener = interruption.listen().await;
        let mut journal = RollbackJournal::new();

        let result = self.build(
            descriptor,
            &env,
            &entry_points,
            &provisioned,
            (&archive, &source_dir),
            &interruption,
            &mut journal,
        );

        match result {
            Ok(receipt) => {
                journal.commit(&self.runtime);
                println!(
                    "   installed {} {} into {}",
                    receipt.name,
                    receipt.version,
                    env.prefix.display()
                );
                Ok(InstallOutcome::Installed(receipt))
            }
            Err(e) => {
                warn!("Install of {} failed, rolling back", descriptor.name);
                if let Err(rollback_error) = journal.rollback(&self.runtime) {
                    warn!("{:#}", rollback_error);
                }
                if interruption.is_raised() {
                    Err(InstallError::Interrupted)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn is_intact(&self, receipt: &Receipt, descriptor: &PackageDescriptor, env: &Environment) -> bool {
        let same_entry_points = descriptor
            .entry_points()
            .map(|eps| {
                eps.len() == receipt.links.len()
                    && eps
                        .iter()
                        .zip(&receipt.links)
                        .all(|(ep, link)| ep.link_name == link.name && ep.path == link.target)
            })
            .unwrap_or(false);
        let same_bin_dir = receipt
            .links
            .iter()
            .all(|link| link.link.parent() == Some(self.config.bin_dir.as_path()));

        receipt.matches(descriptor)
            && same_entry_points
            && same_bin_dir
            && self.link_manager(env).all_valid(&receipt.links)
    }

    /// Unpack supported archives; anything else is placed into the source directory as-is.
    fn unpack(&self, archive: &Path, source_dir: &Path) -> Result<()> {
        if self.extractor.can_handle(archive) {
            self.extractor
                .extract(&self.runtime, archive, source_dir)
                .with_context(|| format!("Failed to unpack {:?}", archive))?;
        } else {
            debug!("{:?} is not an archive, staging it unchanged", archive);
            self.runtime.create_dir_all(source_dir)?;
            if let Some(file_name) = archive.file_name() {
                self.runtime.copy(archive, &source_dir.join(file_name))?;
            }
        }
        Ok(())
    }

    /// Environment creation, install steps, linking, smoke test and receipt.
    /// Every change is recorded in `journal`.
    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        descriptor: &PackageDescriptor,
        env: &Environment,
        entry_points: &[EntryPoint],
        provisioned: &Provisioned,
        (archive, source_dir): (&Path, &Path),
        interruption: &Interruption,
        journal: &mut RollbackJournal,
    ) -> Result<Receipt> {
        let check_interrupted = || {
            if interruption.is_raised() {
                Err(InstallError::Interrupted)
            } else {
                Ok(())
            }
        };

        let previous = self.current_receipt(env);
        if self.runtime.exists(&env.prefix) || self.runtime.is_symlink(&env.prefix) {
            info!("Moving the previous installation of {} aside", env.name);
            journal.move_aside(&self.runtime, &env.prefix, env.backup_path())?;
        }
        self.runtime.create_dir_all(&env.prefix)?;
        journal.created(env.prefix.clone());
        check_interrupted()?;

        println!("   building {} {}", descriptor.name, descriptor.version);
        let ctx = StepContext {
            descriptor,
            environment: env,
            source_dir,
            archive,
            search_path: augmented_path(&provisioned.install_path(), self.current_path())?,
        };
        run_install_steps(&self.runtime, &ctx)?;
        check_interrupted()?;

        let manager = self.link_manager(env);
        let links = manager.expose(entry_points, journal)?;
        if let Some(previous) = &previous {
            manager.remove_stale(&previous.links, &links, journal)?;
        }
        check_interrupted()?;

        let smoke_entry = descriptor
            .smoke_test_entry_point()
            .map_err(InstallError::Descriptor)?;
        let smoke_link = manager.link_path(&smoke_entry.link_name);
        let runtime_path = augmented_path(&provisioned.runtime_path(), self.current_path())?;
        run_smoke_test(&self.runtime, &smoke_link, &descriptor.test, &runtime_path)?;
        check_interrupted()?;

        let receipt = Receipt::new(descriptor, links, provisioned.runtime.clone());
        receipt.save(&self.runtime, &env.receipt_path())?;
        Ok(receipt)
    }

    /// Re-run the recorded smoke test of an installed package.
    #[tracing::instrument(skip(self))]
    pub fn test(&self, name: &str) -> Result<CommandOutput> {
        validate_name(name).map_err(InstallError::Descriptor)?;
        let env = self.environment(name);
        let receipt = Receipt::load_from(&self.runtime, &env.prefix)?
            .ok_or_else(|| InstallError::NotInstalled(name.to_string()))?;
        let link = receipt.smoke_test_link().ok_or_else(|| InstallError::Link {
            entry_point: name.to_string(),
            reason: "the receipt records no entry points".to_string(),
        })?;

        let path_entries: Vec<_> = receipt
            .dependencies
            .iter()
            .filter_map(|d| d.path_entry.clone())
            .collect();
        let search_path = augmented_path(&path_entries, self.current_path())?;
        run_smoke_test(&self.runtime, &link.link, &receipt.test, &search_path)
    }

    /// Remove a package's links and environment.
    #[tracing::instrument(skip(self))]
    pub fn uninstall(&self, name: &str, yes: bool) -> Result<UninstallOutcome> {
        validate_name(name).map_err(InstallError::Descriptor)?;
        let env = self.environment(name);
        let receipt = self.current_receipt(&env);
        if receipt.is_none() && !env.exists(&self.runtime) {
            return Err(InstallError::NotInstalled(name.to_string()));
        }

        let prompt = match &receipt {
            Some(receipt) => format!("Uninstall {} {}?", receipt.name, receipt.version),
            None => format!("Remove the incomplete installation of {}?", name),
        };
        if !yes && !self.runtime.confirm(&prompt)? {
            return Ok(UninstallOutcome::Cancelled);
        }

        let _lock = acquire_package_lock(&self.config.install_root, name)?;
        let manager = self.link_manager(&env);
        let mut links = match &receipt {
            Some(receipt) => manager.unexpose(&receipt.links)?,
            None => 0,
        };
        links += self.remove_orphan_links(&env)?;

        if env.exists(&self.runtime) {
            self.runtime.remove_dir_all(&env.prefix)?;
        }
        if self.runtime.exists(env.backup_path()) {
            self.runtime.remove_dir_all(env.backup_path())?;
        }

        println!("   uninstalled {}", name);
        Ok(UninstallOutcome::Removed { links })
    }

    /// Links in the bin directory that point into the environment but are not recorded.
    fn remove_orphan_links(&self, env: &Environment) -> Result<usize> {
        if !self.runtime.exists(&self.config.bin_dir) {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in self.runtime.read_dir(&self.config.bin_dir)? {
            if self.runtime.is_symlink(&entry)
                && self
                    .runtime
                    .remove_symlink_if_target_under(&entry, &env.prefix)?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Every package installed under the root.
    pub fn list(&self) -> Result<Vec<Receipt>> {
        Ok(find_installed(&self.runtime, &self.config.install_root)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::archive::ArchiveExtractorImpl;
    use crate::deps::{MockDependencyProvider, ResolvedDependency};
    use crate::error::Stage;
    use crate::fetch::MockFetcher;
    use crate::runtime::RealRuntime;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use sha2::{Digest, Sha256};
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    const OK_SCRIPT: &str = "#!/bin/sh\necho \"usage: demo [--help]\"\n";
    const FAILING_SCRIPT: &str = "#!/bin/sh\necho 'ImportError: libcairo.so.2' >&2\nexit 1\n";

    fn demo_archive(script: &str) -> Vec<u8> {
        let mut tar = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_path("demo-1.0/bin/demo").unwrap();
        header.set_size(script.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        tar.append(&header, script.as_bytes()).unwrap();
        tar.into_inner().unwrap().finish().unwrap()
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    fn descriptor(sha256: &str, extra: &str) -> PackageDescriptor {
        format!(
            r#"
name = "demo"
version = "1.0.0"
url = "https://example/demo-1.0.tar.gz"
sha256 = "{}"
license = "MIT"
entry_points = ["demo"]
{}
"#,
            sha256, extra
        )
        .parse()
        .unwrap()
    }

    /// A fetcher that serves `bytes` and must be called `times` times.
    fn fetcher_serving(bytes: Vec<u8>, times: usize) -> MockFetcher {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(times)
            .returning(move |_, dest| {
                fs::write(dest, &bytes)?;
                Ok(bytes.len() as u64)
            });
        fetcher
    }

    fn any_provider() -> MockDependencyProvider {
        let mut provider = MockDependencyProvider::new();
        provider.expect_resolve().returning(|dep| {
            Ok(ResolvedDependency {
                name: dep.name.clone(),
                location: PathBuf::from("/bin/sh"),
                version: None,
                path_entry: Some(PathBuf::from("/bin")),
            })
        });
        provider
    }

    fn installer(
        dir: &TempDir,
        fetcher: MockFetcher,
        provider: MockDependencyProvider,
    ) -> Installer<RealRuntime, MockFetcher, MockDependencyProvider, ArchiveExtractorImpl> {
        let root = dir.path().join("root");
        Installer::new(
            RealRuntime,
            fetcher,
            provider,
            ArchiveExtractorImpl::new(),
            Config {
                bin_dir: root.join("bin"),
                install_root: root,
                fetch_timeout: Duration::from_secs(5),
            },
        )
    }

    fn tree_snapshot(root: &Path) -> Vec<(PathBuf, String)> {
        let mut entries = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                let meta = fs::symlink_metadata(&path).unwrap();
                let content = if meta.file_type().is_symlink() {
                    format!("-> {}", fs::read_link(&path).unwrap().display())
                } else if meta.is_dir() {
                    stack.push(path.clone());
                    "dir".to_string()
                } else {
                    fs::read_to_string(&path).unwrap_or_default()
                };
                entries.push((path, content));
            }
        }
        entries.sort();
        entries
    }

    #[tokio::test]
    async fn test_install_links_entry_point_and_writes_receipt() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let descriptor = descriptor(&sha256_hex(&archive), "");
        let installer = installer(&dir, fetcher_serving(archive, 1), any_provider());

        let outcome = installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap();

        let root = dir.path().join("root");
        let InstallOutcome::Installed(receipt) = outcome else {
            panic!("expected a fresh install");
        };
        assert_eq!(receipt.links.len(), 1);
        assert_eq!(
            fs::read_link(root.join("bin/demo")).unwrap(),
            PathBuf::from("../demo/bin/demo")
        );
        assert!(root.join("demo/receipt.json").exists());
        assert!(crate::lock::acquire_package_lock(&root, "demo").is_ok());
        assert!(!root.join(".demo.backup").exists());

        let output = installer.test("demo").unwrap();
        assert!(output.stdout.contains("usage: demo"));

        let listed = installer.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].version, "1.0.0");
    }

    #[tokio::test]
    async fn test_integrity_failure_leaves_root_untouched() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let mut sha = sha256_hex(&archive);
        let flipped = if sha.ends_with('0') { "1" } else { "0" };
        sha.replace_range(63.., flipped);

        // Provisioning must not even be attempted
        let installer = installer(&dir, fetcher_serving(archive, 1), MockDependencyProvider::new());
        let err = installer
            .install(&descriptor(&sha, ""), InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Verify);
        assert!(err.to_string().contains(&sha));
        assert!(!dir.path().join("root").exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_as_fetch_stage() {
        let dir = tempdir().unwrap();
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_, _| Err(anyhow::anyhow!("Not found: https://example/demo-1.0.tar.gz")));

        let installer = installer(&dir, fetcher, MockDependencyProvider::new());
        let err = installer
            .install(&descriptor(&"0".repeat(64), ""), InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Fetch);
        assert!(!dir.path().join("root").exists());
    }

    #[tokio::test]
    async fn test_reinstall_is_a_no_op_and_force_is_idempotent() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let descriptor = descriptor(&sha256_hex(&archive), "");
        let installer = installer(&dir, fetcher_serving(archive, 2), any_provider());
        let root = dir.path().join("root");

        installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap();
        let first = tree_snapshot(&root);

        let again = installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap();
        assert!(matches!(again, InstallOutcome::AlreadyInstalled(_)));
        assert_eq!(tree_snapshot(&root), first);

        let forced = installer
            .install(&descriptor, InstallOptions { force: true })
            .await
            .unwrap();
        assert!(matches!(forced, InstallOutcome::Installed(_)));
        assert_eq!(tree_snapshot(&root), first);
    }

    #[tokio::test]
    async fn test_broken_link_triggers_reinstall() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let descriptor = descriptor(&sha256_hex(&archive), "");
        let installer = installer(&dir, fetcher_serving(archive, 2), any_provider());
        let root = dir.path().join("root");

        installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap();
        fs::remove_file(root.join("bin/demo")).unwrap();

        let outcome = installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap();
        assert!(matches!(outcome, InstallOutcome::Installed(_)));
        assert!(root.join("bin/demo").exists());
    }

    #[test_log::test(tokio::test)]
    async fn test_smoke_test_failure_rolls_back_everything() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(FAILING_SCRIPT);
        let descriptor = descriptor(&sha256_hex(&archive), "");
        let installer = installer(&dir, fetcher_serving(archive, 1), any_provider());
        let root = dir.path().join("root");

        let err = installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::SmokeTest);
        assert!(err.to_string().contains("libcairo.so.2"));
        assert!(!root.join("demo").exists());
        assert!(fs::symlink_metadata(root.join("bin/demo")).is_err());
        assert!(installer.list().unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_upgrade_restores_previous_installation() {
        let dir = tempdir().unwrap();
        let good = demo_archive(OK_SCRIPT);
        let bad = demo_archive(FAILING_SCRIPT);
        let root = dir.path().join("root");

        let first = installer(&dir, fetcher_serving(good.clone(), 1), any_provider());
        first
            .install(&descriptor(&sha256_hex(&good), ""), InstallOptions::default())
            .await
            .unwrap();
        let before = tree_snapshot(&root);

        let mut upgrade = descriptor(&sha256_hex(&bad), "");
        upgrade.version = "1.1.0".into();
        let second = installer(&dir, fetcher_serving(bad, 1), any_provider());
        let err = second
            .install(&upgrade, InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::SmokeTest);
        assert_eq!(tree_snapshot(&root), before);
        assert_eq!(second.list().unwrap()[0].version, "1.0.0");
    }

    #[tokio::test]
    async fn test_failing_install_step_is_a_build_error() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let descriptor = descriptor(
            &sha256_hex(&archive),
            r#"
[install]
steps = [["sh", "-c", "echo 'error: cairo not found' >&2; exit 3"]]
"#,
        );
        let installer = installer(&dir, fetcher_serving(archive, 1), any_provider());

        let err = installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap_err();

        match &err {
            InstallError::Build { status, output, .. } => {
                assert_eq!(status, "exit code 3");
                assert!(output.contains("cairo not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("root/demo").exists());
    }

    #[tokio::test]
    async fn test_missing_dependency_stops_before_the_root() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let descriptor = descriptor(
            &sha256_hex(&archive),
            r#"
[[dependencies]]
name = "cairo"
files = ["/nonexistent/libcairo.so*"]
"#,
        );
        let mut provider = MockDependencyProvider::new();
        provider
            .expect_resolve()
            .returning(|_| Err(anyhow::anyhow!("no file matches /nonexistent/libcairo.so*")));

        let installer = installer(&dir, fetcher_serving(archive, 1), provider);
        let err = installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Dependencies);
        assert!(err.to_string().contains("cairo"));
        assert!(!dir.path().join("root").exists());
    }

    #[tokio::test]
    async fn test_link_conflict_keeps_foreign_file() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let descriptor = descriptor(&sha256_hex(&archive), "");
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/demo"), "not ours").unwrap();

        let installer = installer(&dir, fetcher_serving(archive, 1), any_provider());
        let err = installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Link);
        assert_eq!(fs::read_to_string(root.join("bin/demo")).unwrap(), "not ours");
        assert!(!root.join("demo").exists());
    }

    #[tokio::test]
    async fn test_uninstall_removes_links_and_environment() {
        let dir = tempdir().unwrap();
        let archive = demo_archive(OK_SCRIPT);
        let descriptor = descriptor(&sha256_hex(&archive), "");
        let installer = installer(&dir, fetcher_serving(archive, 1), any_provider());
        let root = dir.path().join("root");

        installer
            .install(&descriptor, InstallOptions::default())
            .await
            .unwrap();

        let outcome = installer.uninstall("demo", true).unwrap();
        assert_eq!(outcome, UninstallOutcome::Removed { links: 1 });
        assert!(!root.join("demo").exists());
        assert!(fs::symlink_metadata(root.join("bin/demo")).is_err());
        assert!(installer.list().unwrap().is_empty());

        let err = installer.uninstall("demo", true).unwrap_err();
        assert_eq!(err.stage(), Stage::Lookup);
    }

    #[test]
    fn test_operations_on_missing_package() {
        let dir = tempdir().unwrap();
        let installer = installer(&dir, MockFetcher::new(), MockDependencyProvider::new());

        assert_eq!(installer.test("demo").unwrap_err().stage(), Stage::Lookup);
        assert_eq!(
            installer.uninstall("demo", true).unwrap_err().stage(),
            Stage::Lookup
        );
        assert_eq!(
            installer.test("../etc").unwrap_err().stage(),
            Stage::Descriptor
        );
        assert!(installer.list().unwrap().is_empty());
    }
}
