use semver::VersionReq;
use serde::{Deserialize, Serialize};
use std::fmt;

/// When a dependency must be reachable.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Needed by the installed package whenever it runs.
    #[default]
    Runtime,
    /// Needed only while the install steps run.
    Build,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Runtime => f.write_str("runtime"),
            DependencyKind::Build => f.write_str("build"),
        }
    }
}

/// A dependency declared by a package descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DependencyDeclaration {
    pub name: String,

    #[serde(default)]
    pub kind: DependencyKind,

    /// Semver requirement, e.g. `">=3.10"`.
    #[serde(default)]
    pub version: Option<VersionReq>,

    /// Executable to look for on the search path. Defaults to `name`.
    #[serde(default)]
    pub command: Option<String>,

    /// Glob patterns probed for dependencies that are not executables
    /// (shared libraries, data files).
    #[serde(default)]
    pub files: Vec<String>,
}

impl DependencyDeclaration {
    pub fn new(name: &str, kind: DependencyKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            version: None,
            command: None,
            files: Vec::new(),
        }
    }

    /// Name of the executable probed on the search path.
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.name)
    }

    pub fn is_runtime(&self) -> bool {
        self.kind == DependencyKind::Runtime
    }
}

impl fmt::Display for DependencyDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(req) => write!(f, "{} ({}, {})", self.name, self.kind, req),
            None => write!(f, "{} ({})", self.name, self.kind),
        }
    }
}
