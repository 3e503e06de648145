//! Package descriptors: the static TOML declaration of what to install.
//!
//! ```toml
//! name = "demo"
//! version = "1.0.0"
//! homepage = "https://example.com/demo"
//! url = "https://example.com/demo-1.0.0.tar.gz"
//! sha256 = "<64 hex characters>"
//! license = "MIT"
//! entry_points = ["demo"]
//!
//! [[dependencies]]
//! name = "python3"
//! version = ">=3.10"
//!
//! [install]
//! steps = [["python3", "-m", "venv", "{prefix}"], ["{bin}/pip", "install", "{archive}"]]
//!
//! [test]
//! args = ["--help"]
//! ```

mod dependency;
mod recipe;

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use crate::runtime::Runtime;

pub use dependency::{DependencyDeclaration, DependencyKind};
pub use recipe::{EntryPoint, InstallRecipe, PLACEHOLDERS, SmokeTest, expand_placeholders};

/// Names that would collide with the installer's own bookkeeping in the root.
const RESERVED_NAMES: &[&str] = &["bin"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub homepage: Option<String>,
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDeclaration>,
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub install: InstallRecipe,
    #[serde(default)]
    pub test: SmokeTest,
}

impl FromStr for PackageDescriptor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let descriptor: PackageDescriptor =
            toml::from_str(s).context("Failed to parse package descriptor")?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}

impl PackageDescriptor {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read descriptor {:?}", path))?;
        content
            .parse()
            .with_context(|| format!("Invalid descriptor {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        ensure!(!self.version.trim().is_empty(), "version must not be empty");
        ensure!(!self.url.trim().is_empty(), "url must not be empty");
        ensure!(
            self.sha256.len() == 64 && self.sha256.chars().all(|c| c.is_ascii_hexdigit()),
            "sha256 must be 64 hexadecimal characters, got {:?}",
            self.sha256
        );

        let mut dependency_names = HashSet::new();
        for dep in &self.dependencies {
            validate_name(&dep.name).context("invalid dependency")?;
            ensure!(
                dependency_names.insert(dep.name.as_str()),
                "dependency '{}' is declared twice",
                dep.name
            );
            ensure!(
                dep.name != self.name,
                "package '{}' cannot depend on itself",
                self.name
            );
        }

        ensure!(
            !self.entry_points.is_empty(),
            "at least one entry point must be declared"
        );
        let entry_points = self.entry_points()?;
        let mut link_names = HashSet::new();
        for entry in &entry_points {
            ensure!(
                link_names.insert(entry.link_name.as_str()),
                "two entry points would both be exposed as '{}'",
                entry.link_name
            );
        }

        if let Some(command) = &self.test.command {
            ensure!(
                link_names.contains(command.as_str()),
                "smoke test command '{}' is not one of the entry points",
                command
            );
        }

        self.install.validate()
    }

    /// Parsed entry points in declaration order.
    pub fn entry_points(&self) -> Result<Vec<EntryPoint>> {
        self.entry_points
            .iter()
            .map(|spec| EntryPoint::parse(spec))
            .collect()
    }

    /// The entry point the smoke test invokes.
    pub fn smoke_test_entry_point(&self) -> Result<EntryPoint> {
        let entry_points = self.entry_points()?;
        let selected = match &self.test.command {
            Some(command) => entry_points.into_iter().find(|e| &e.link_name == command),
            None => entry_points.into_iter().next(),
        };
        selected.context("no entry point available for the smoke test")
    }

    /// Expected digest, normalised to lowercase.
    pub fn expected_sha256(&self) -> String {
        self.sha256.to_ascii_lowercase()
    }

    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &DependencyDeclaration> {
        self.dependencies.iter().filter(|d| d.is_runtime())
    }

    pub fn build_dependencies(&self) -> impl Iterator<Item = &DependencyDeclaration> {
        self.dependencies.iter().filter(|d| !d.is_runtime())
    }

    /// File name the archive is staged under, derived from the URL's last path segment.
    pub fn archive_file_name(&self) -> String {
        let without_query = self.url.split(['?', '#']).next().unwrap_or_default();
        without_query
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}.download", self.name, self.version))
    }
}

/// Package names become directory names under the installation root.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("package name must not be empty");
    }
    if name.starts_with('.') {
        bail!("package name '{}' must not start with '.'", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '@'))
    {
        bail!(
            "package name '{}' may only contain letters, digits and -_.+@",
            name
        );
    }
    if RESERVED_NAMES.contains(&name) {
        bail!("package name '{}' is reserved", name);
    }
    Ok(())
}
