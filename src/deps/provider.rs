//! Locating dependencies.

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::descriptor::DependencyDeclaration;
use crate::receipt::Receipt;
use crate::runtime::{CommandSpec, Runtime};

/// A dependency located by a [`DependencyProvider`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    /// Executable, file or environment prefix that satisfied the declaration.
    pub location: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Directory to put on `PATH` so the dependency is reachable from install steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_entry: Option<PathBuf>,
}

/// Capability that satisfies a declared dependency.
#[cfg_attr(test, mockall::automock)]
pub trait DependencyProvider: Send + Sync {
    /// Locate `dependency`, checking its version constraint where one is declared.
    fn resolve(&self, dependency: &DependencyDeclaration) -> Result<ResolvedDependency>;
}

/// Resolves dependencies from what is already present on the machine, in order:
/// packages installed in the same root, `files` globs, then the `PATH`.
pub struct SearchPathProvider<R: Runtime> {
    runtime: R,
    install_root: PathBuf,
}

impl<R: Runtime> SearchPathProvider<R> {
    pub fn new(runtime: R, install_root: PathBuf) -> Self {
        Self {
            runtime,
            install_root,
        }
    }

    fn from_install_root(
        &self,
        dependency: &DependencyDeclaration,
    ) -> Result<Option<ResolvedDependency>> {
        let env_dir = self.install_root.join(&dependency.name);
        let Some(receipt) = Receipt::load_from(&self.runtime, &env_dir)? else {
            return Ok(None);
        };

        if let Some(req) = &dependency.version {
            check_version(req, &receipt.version).with_context(|| {
                format!("installed package {} {}", receipt.name, receipt.version)
            })?;
        }

        debug!("{} satisfied by installed package at {:?}", dependency.name, env_dir);
        let bin_dir = env_dir.join("bin");
        Ok(Some(ResolvedDependency {
            name: dependency.name.clone(),
            path_entry: self.runtime.is_dir(&bin_dir).then_some(bin_dir),
            location: env_dir,
            version: Some(receipt.version),
        }))
    }

    fn from_files(&self, dependency: &DependencyDeclaration) -> Result<Option<ResolvedDependency>> {
        for pattern in &dependency.files {
            let matches = self
                .runtime
                .glob(pattern)
                .with_context(|| format!("Invalid file pattern '{}'", pattern))?;
            if let Some(found) = matches.into_iter().next() {
                debug!("{} satisfied by {:?}", dependency.name, found);
                if let Some(req) = &dependency.version {
                    warn!(
                        "Cannot verify {} {} from a file match; accepting {:?}",
                        dependency.name, req, found
                    );
                }
                return Ok(Some(ResolvedDependency {
                    name: dependency.name.clone(),
                    location: found,
                    version: None,
                    path_entry: None,
                }));
            }
        }
        Ok(None)
    }

    fn from_path(&self, dependency: &DependencyDeclaration) -> Result<Option<ResolvedDependency>> {
        let command = dependency.command_name();
        let Some(executable) = self.find_executable(command) else {
            return Ok(None);
        };
        debug!("{} satisfied by {:?}", dependency.name, executable);

        let version = match &dependency.version {
            Some(req) => self.probe_version(dependency, req, &executable)?,
            None => None,
        };

        Ok(Some(ResolvedDependency {
            name: dependency.name.clone(),
            path_entry: executable.parent().map(Path::to_path_buf),
            location: executable,
            version,
        }))
    }

    /// Run `<command> --version` and check the first version-looking token against `req`.
    fn probe_version(
        &self,
        dependency: &DependencyDeclaration,
        req: &VersionReq,
        executable: &Path,
    ) -> Result<Option<String>> {
        let output = self
            .runtime
            .run(&CommandSpec::new(executable).args(["--version"]));
        let detected = match output {
            Ok(output) => parse_loose_version(&output.combined()),
            Err(e) => {
                debug!("Failed to query version of {:?}: {:#}", executable, e);
                None
            }
        };

        match detected {
            Some(version) => {
                check_version(req, &version.to_string())
                    .with_context(|| format!("{:?} reports {}", executable, version))?;
                Ok(Some(version.to_string()))
            }
            None => {
                warn!(
                    "Cannot determine the version of {:?}; assuming it satisfies {} {}",
                    executable, dependency.name, req
                );
                Ok(None)
            }
        }
    }

    fn find_executable(&self, command: &str) -> Option<PathBuf> {
        let path_var = self.runtime.env_var("PATH").ok()?;
        std::env::split_paths(&path_var)
            .filter(|dir| !dir.as_os_str().is_empty())
            .flat_map(|dir| executable_candidates(&dir, command))
            .find(|candidate| self.runtime.is_executable(candidate))
    }
}

impl<R: Runtime> DependencyProvider for SearchPathProvider<R> {
    #[tracing::instrument(skip(self, dependency), fields(dependency = %dependency.name))]
    fn resolve(&self, dependency: &DependencyDeclaration) -> Result<ResolvedDependency> {
        if let Some(found) = self.from_install_root(dependency)? {
            return Ok(found);
        }
        if let Some(found) = self.from_files(dependency)? {
            return Ok(found);
        }
        if !dependency.files.is_empty() && dependency.command.is_none() {
            bail!("no file matches {}", dependency.files.join(", "));
        }
        if let Some(found) = self.from_path(dependency)? {
            return Ok(found);
        }
        bail!(
            "`{}` was not found on PATH or in {:?}",
            dependency.command_name(),
            self.install_root
        )
    }
}

#[cfg(windows)]
fn executable_candidates(dir: &Path, command: &str) -> Vec<PathBuf> {
    vec![dir.join(format!("{}.exe", command)), dir.join(command)]
}

#[cfg(not(windows))]
fn executable_candidates(dir: &Path, command: &str) -> Vec<PathBuf> {
    vec![dir.join(command)]
}

fn check_version(req: &VersionReq, version: &str) -> Result<()> {
    let parsed = Version::parse(version)
        .ok()
        .or_else(|| parse_loose_version(version))
        .or_else(|| parse_loose_version(&format!("{}.0", version)))
        .with_context(|| format!("version '{}' is not comparable with {}", version, req))?;
    if !req.matches(&parsed) {
        bail!("version {} does not satisfy {}", parsed, req);
    }
    Ok(())
}

/// Extract the first `major[.minor[.patch]]` token from free text such as
/// `Python 3.12.1` or `uv 0.4.18 (Homebrew)`. Missing components are zero.
pub fn parse_loose_version(text: &str) -> Option<Version> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .map(|token| token.trim_start_matches(['v', 'V']))
        .find_map(|token| {
            let numeric: Vec<&str> = token
                .split(['.', '-', '+'])
                .take(3)
                .take_while(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
                .collect();
            // A lone integer is too ambiguous to be a version
            if numeric.len() < 2 {
                return None;
            }
            let major = numeric[0].parse().ok()?;
            let minor = numeric[1].parse().ok()?;
            let patch = numeric.get(2).map_or(Some(0), |p| p.parse().ok())?;
            Some(Version::new(major, minor, patch))
        })
}
