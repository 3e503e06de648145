//! Isolated per-package environments and install step execution.

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::descriptor::{PackageDescriptor, expand_placeholders};
use crate::error::{InstallError, describe_status};
use crate::receipt::Receipt;
use crate::runtime::{CommandSpec, Runtime};

/// Environment variable pointing install steps at the environment prefix.
pub const PREFIX_ENV: &str = "ISOPKG_PREFIX";
/// Environment variable pointing install steps at the unpacked source tree.
pub const SOURCE_ENV: &str = "ISOPKG_SOURCE";

/// Layout of one package's environment: `<install_root>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub prefix: PathBuf,
    backup: PathBuf,
}

impl Environment {
    pub fn new(install_root: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: install_root.join(name),
            backup: install_root.join(format!(".{}.backup", name)),
        }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn receipt_path(&self) -> PathBuf {
        Receipt::path_in(&self.prefix)
    }

    /// Where a previous installation is parked while a new one is built.
    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn exists<R: Runtime>(&self, runtime: &R) -> bool {
        runtime.exists(&self.prefix)
    }
}

/// Everything an install step may refer to.
pub struct StepContext<'a> {
    pub descriptor: &'a PackageDescriptor,
    pub environment: &'a Environment,
    pub source_dir: &'a Path,
    pub archive: &'a Path,
    /// Value of `PATH` for the step processes.
    pub search_path: String,
}

impl StepContext<'_> {
    fn placeholders(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("prefix", self.environment.prefix.display().to_string()),
            ("bin", self.environment.bin_dir().display().to_string()),
            ("source", self.source_dir.display().to_string()),
            ("archive", self.archive.display().to_string()),
            ("name", self.descriptor.name.clone()),
            ("version", self.descriptor.version.clone()),
        ])
    }

    /// Expand one recipe step into a runnable command.
    pub fn command_for(&self, step: &[String]) -> CommandSpec {
        let vars = self.placeholders();
        let mut argv = step.iter().map(|arg| expand_placeholders(arg, &vars));
        let program = argv.next().unwrap_or_default();
        CommandSpec::new(program)
            .args(argv)
            .cwd(self.source_dir)
            .env("PATH", self.search_path.clone())
            .env(PREFIX_ENV, self.environment.prefix.display().to_string())
            .env(SOURCE_ENV, self.source_dir.display().to_string())
    }
}

/// Run the descriptor's install steps in order, stopping at the first failure.
/// Without steps the unpacked source tree is copied into the environment.
#[tracing::instrument(skip(runtime, ctx), fields(package = %ctx.descriptor.name))]
pub fn run_install_steps<R: Runtime>(runtime: &R, ctx: &StepContext<'_>) -> Result<(), InstallError> {
    let steps = &ctx.descriptor.install.steps;
    if steps.is_empty() {
        info!("No install steps; copying {:?} into the environment", ctx.source_dir);
        copy_tree(runtime, ctx.source_dir, &ctx.environment.prefix)?;
        return Ok(());
    }

    for (i, step) in steps.iter().enumerate() {
        let command = ctx.command_for(step);
        info!("[{}/{}] {}", i + 1, steps.len(), command.display());

        let output = runtime.run(&command).map_err(|e| InstallError::Build {
            step: command.display(),
            status: "could not be started".to_string(),
            output: format!("{:#}", e),
        })?;

        if !output.success() {
            return Err(InstallError::Build {
                step: command.display(),
                status: describe_status(output.code),
                output: output.combined(),
            });
        }
        debug!("{}", output.combined());
    }
    Ok(())
}

/// Recursively copy `from` into `to`, preserving symlinks as symlinks.
#[tracing::instrument(skip(runtime))]
pub fn copy_tree<R: Runtime>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    runtime.create_dir_all(to)?;
    for entry in runtime.read_dir(from)? {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let dest = to.join(name);
        if runtime.is_symlink(&entry) {
            let target = runtime.read_link(&entry)?;
            runtime.symlink(&target, &dest)?;
        } else if runtime.is_dir(&entry) {
            copy_tree(runtime, &entry, &dest)?;
        } else {
            runtime
                .copy(&entry, &dest)
                .with_context(|| format!("Failed to copy {:?} to {:?}", entry, dest))?;
        }
    }
    Ok(())
}
