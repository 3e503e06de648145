//! Stage error taxonomy for the install procedure.
//!
//! Helpers deeper in the crate return `anyhow::Result` and attach context; the
//! installer converts failures into an [`InstallError`] at each stage boundary so
//! the caller always learns which stage failed.

use std::fmt;
use thiserror::Error;

/// The stage of the install procedure an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Descriptor,
    Fetch,
    Verify,
    Dependencies,
    Lock,
    Build,
    Link,
    SmokeTest,
    Lookup,
    Filesystem,
    Interrupted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Descriptor => "descriptor",
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Dependencies => "dependencies",
            Stage::Lock => "lock",
            Stage::Build => "build",
            Stage::Link => "link",
            Stage::SmokeTest => "smoke-test",
            Stage::Lookup => "lookup",
            Stage::Filesystem => "filesystem",
            Stage::Interrupted => "interrupted",
        }
    }

    /// Process exit code reported by the CLI for a failure in this stage.
    pub fn exit_code(&self) -> u8 {
        match self {
            Stage::Filesystem => 1,
            Stage::Descriptor => 2,
            Stage::Fetch => 10,
            Stage::Verify => 11,
            Stage::Dependencies => 12,
            Stage::Lock => 13,
            Stage::Build => 14,
            Stage::Link => 15,
            Stage::SmokeTest => 16,
            Stage::Lookup => 17,
            // Conventional 128 + SIGINT
            Stage::Interrupted => 130,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("invalid descriptor: {0:#}")]
    Descriptor(anyhow::Error),

    #[error("failed to fetch {url}: {source:#}")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// Never retried: a mismatch means a corrupted mirror or tampering.
    #[error("sha256 mismatch for {url}\n  expected: {expected}\n  actual:   {actual}")]
    Integrity {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("dependency '{name}' is not available: {reason}")]
    Dependency { name: String, reason: String },

    #[error("{0}")]
    Lock(String),

    #[error("install step `{step}` failed ({status})\n{output}")]
    Build {
        step: String,
        status: String,
        output: String,
    },

    #[error("cannot expose entry point '{entry_point}': {reason}")]
    Link { entry_point: String, reason: String },

    #[error("smoke test `{command}` failed ({status})\n{output}")]
    SmokeTest {
        command: String,
        status: String,
        output: String,
    },

    #[error("package '{0}' is not installed")]
    NotInstalled(String),

    #[error("interrupted; changes were rolled back")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl InstallError {
    pub fn stage(&self) -> Stage {
        match self {
            InstallError::Descriptor(_) => Stage::Descriptor,
            InstallError::Fetch { .. } => Stage::Fetch,
            InstallError::Integrity { .. } => Stage::Verify,
            InstallError::Dependency { .. } => Stage::Dependencies,
            InstallError::Lock(_) => Stage::Lock,
            InstallError::Build { .. } => Stage::Build,
            InstallError::Link { .. } => Stage::Link,
            InstallError::SmokeTest { .. } => Stage::SmokeTest,
            InstallError::NotInstalled(_) => Stage::Lookup,
            InstallError::Io(_) => Stage::Filesystem,
            InstallError::Interrupted => Stage::Interrupted,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.stage().exit_code()
    }
}

/// Render an exit status the way users expect to read it.
pub(crate) fn describe_status(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, InstallError>;
