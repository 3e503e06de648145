//! Dependency provisioning.
//!
//! Every declared dependency is handed to a [`DependencyProvider`]. Build
//! dependencies only need to be reachable while the install steps run; runtime
//! dependencies stay reachable for the smoke test and are recorded in the receipt.

mod provider;

use anyhow::{Context, Result};
use log::info;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::descriptor::{DependencyDeclaration, PackageDescriptor};
use crate::error::InstallError;

pub use provider::{DependencyProvider, ResolvedDependency, SearchPathProvider, parse_loose_version};

#[cfg(test)]
pub use provider::MockDependencyProvider;

/// Dependencies located for one install.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provisioned {
    pub runtime: Vec<ResolvedDependency>,
    pub build: Vec<ResolvedDependency>,
}

impl Provisioned {
    /// `PATH` entries for the install steps: build and runtime dependencies.
    pub fn install_path(&self) -> Vec<PathBuf> {
        unique_path_entries(self.build.iter().chain(self.runtime.iter()))
    }

    /// `PATH` entries for the smoke test: runtime dependencies only.
    pub fn runtime_path(&self) -> Vec<PathBuf> {
        unique_path_entries(self.runtime.iter())
    }
}

fn unique_path_entries<'a>(deps: impl Iterator<Item = &'a ResolvedDependency>) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in deps.filter_map(|d| d.path_entry.clone()) {
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    entries
}

/// Resolve every declared dependency, failing on the first one the provider cannot satisfy.
#[tracing::instrument(skip(provider, descriptor), fields(package = %descriptor.name))]
pub fn provision<D: DependencyProvider + ?Sized>(
    provider: &D,
    descriptor: &PackageDescriptor,
) -> Result<Provisioned, InstallError> {
    let mut provisioned = Provisioned::default();
    for dependency in &descriptor.dependencies {
        let resolved = resolve_one(provider, dependency)?;
        info!("dependency {} -> {:?}", dependency, resolved.location);
        if dependency.is_runtime() {
            provisioned.runtime.push(resolved);
        } else {
            provisioned.build.push(resolved);
        }
    }
    Ok(provisioned)
}

fn resolve_one<D: DependencyProvider + ?Sized>(
    provider: &D,
    dependency: &DependencyDeclaration,
) -> Result<ResolvedDependency, InstallError> {
    provider
        .resolve(dependency)
        .map_err(|e| InstallError::Dependency {
            name: dependency.name.clone(),
            reason: format!("{:#}", e),
        })
}

/// Prepend `entries` to an existing search path value.
pub fn augmented_path(entries: &[PathBuf], current: Option<OsString>) -> Result<String> {
    let mut all: Vec<PathBuf> = entries.to_vec();
    if let Some(current) = current {
        all.extend(std::env::split_paths(&current));
    }
    let joined = std::env::join_paths(all).context("A dependency directory cannot be put on PATH")?;
    joined
        .into_string()
        .map_err(|p| anyhow::anyhow!("PATH is not valid unicode: {:?}", p))
}
