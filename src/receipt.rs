//! Installed-package receipts: `<root>/<name>/receipt.json`.
//!
//! A receipt is written last, after the smoke test passed, so its presence marks a
//! complete installation. It carries no timestamps: installing the same descriptor
//! twice produces a byte-identical file.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::deps::ResolvedDependency;
use crate::descriptor::{PackageDescriptor, SmokeTest};
use crate::runtime::Runtime;

pub const RECEIPT_FILE: &str = "receipt.json";

/// One exposed entry point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    /// Name of the link in the shared bin directory.
    pub name: String,
    /// Location of the executable relative to the environment prefix.
    pub target: PathBuf,
    /// Absolute path of the link.
    pub link: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Receipt {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub links: Vec<LinkRecord>,
    #[serde(default)]
    pub dependencies: Vec<ResolvedDependency>,
    #[serde(default)]
    pub test: SmokeTest,
}

impl Receipt {
    pub fn new(
        descriptor: &PackageDescriptor,
        links: Vec<LinkRecord>,
        dependencies: Vec<ResolvedDependency>,
    ) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            url: descriptor.url.clone(),
            sha256: descriptor.expected_sha256(),
            homepage: descriptor.homepage.clone(),
            license: descriptor.license.clone(),
            links,
            dependencies,
            test: descriptor.test.clone(),
        }
    }

    pub fn path_in(env_dir: &Path) -> PathBuf {
        env_dir.join(RECEIPT_FILE)
    }

    /// Whether this receipt records exactly the package the descriptor declares.
    pub fn matches(&self, descriptor: &PackageDescriptor) -> bool {
        self.name == descriptor.name
            && self.version == descriptor.version
            && self.sha256.eq_ignore_ascii_case(&descriptor.sha256)
    }

    /// Link name of the smoke test entry point, falling back to the first link.
    pub fn smoke_test_link(&self) -> Option<&LinkRecord> {
        match &self.test.command {
            Some(command) => self.links.iter().find(|l| &l.name == command),
            None => self.links.first(),
        }
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read receipt {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Corrupt receipt {:?}", path))
    }

    /// Load the receipt in `env_dir`, or `None` when there is none.
    pub fn load_from<R: Runtime>(runtime: &R, env_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(env_dir);
        if !runtime.exists(&path) {
            return Ok(None);
        }
        Self::load(runtime, &path).map(Some)
    }

    /// Write the receipt atomically: temp file in the same directory, then rename.
    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        runtime
            .write(&tmp_path, json.as_bytes())
            .with_context(|| format!("Failed to write receipt to {:?}", tmp_path))?;
        runtime
            .rename(&tmp_path, path)
            .with_context(|| format!("Failed to move receipt into place at {:?}", path))
    }
}

/// Receipts of every package installed under `root`, sorted by name.
///
/// Directory structure: `<root>/<name>/receipt.json`. Dot-prefixed entries hold
/// locks and moved-aside backups and are never packages.
#[tracing::instrument(skip(runtime))]
pub fn find_installed<R: Runtime>(runtime: &R, root: &Path) -> Result<Vec<Receipt>> {
    let mut receipts = Vec::new();
    if !runtime.exists(root) {
        return Ok(receipts);
    }

    for env_dir in runtime.read_dir(root)? {
        let hidden = env_dir
            .file_name()
            .is_none_or(|n| n.to_string_lossy().starts_with('.'));
        if hidden || !runtime.is_dir(&env_dir) || runtime.is_symlink(&env_dir) {
            continue;
        }
        match Receipt::load_from(runtime, &env_dir) {
            Ok(Some(receipt)) => receipts.push(receipt),
            Ok(None) => {}
            Err(e) => debug!("Skipping {:?}: {:#}", env_dir, e),
        }
    }

    receipts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(receipts)
}
