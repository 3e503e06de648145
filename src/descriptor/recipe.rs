//! Install recipe, entry points and smoke test declarations.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

/// Placeholders recognised inside install step arguments.
pub const PLACEHOLDERS: &[&str] = &["prefix", "bin", "source", "archive", "name", "version"];

/// Ordered install steps, each an argv list run inside the unpacked source tree.
///
/// `{name}` tokens are placeholders; `${name}` is left for the shell.
///
/// An empty recipe copies the unpacked source tree into the environment as-is,
/// which suits archives that already carry a `bin/` layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct InstallRecipe {
    #[serde(default)]
    pub steps: Vec<Vec<String>>,
}

impl InstallRecipe {
    pub fn validate(&self) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            let Some(program) = step.first() else {
                bail!("install step {} is empty", i + 1);
            };
            if program.trim().is_empty() {
                bail!("install step {} has an empty program", i + 1);
            }
            for arg in step {
                for (_, name) in placeholder_tokens(arg) {
                    if !PLACEHOLDERS.contains(&name) {
                        bail!(
                            "install step {} uses unknown placeholder {{{}}} (known: {})",
                            i + 1,
                            name,
                            PLACEHOLDERS.join(", ")
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// Locate `{name}` tokens in `arg` where `name` is an identifier.
///
/// Shell expansions such as `${d}` and other brace text (`awk '{print $1}'`)
/// are not tokens and pass through untouched.
fn placeholder_tokens(arg: &str) -> Vec<(Range<usize>, &str)> {
    let mut tokens = Vec::new();
    let mut search = 0;
    while let Some(offset) = arg[search..].find('{') {
        let start = search + offset;
        if arg[..start].ends_with('$') {
            search = start + 1;
            continue;
        }
        let Some(len) = arg[start + 1..].find('}') else {
            break;
        };
        let end = start + 1 + len;
        let name = &arg[start + 1..end];
        if is_identifier(name) {
            tokens.push((start..end + 1, name));
            search = end + 1;
        } else {
            search = start + 1;
        }
    }
    tokens
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace `{name}` placeholders in `arg` with values from `vars`.
/// Braces that do not form a known placeholder are left untouched.
pub fn expand_placeholders(arg: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut copied = 0;
    for (range, name) in placeholder_tokens(arg) {
        if let Some(value) = vars.get(name) {
            out.push_str(&arg[copied..range.start]);
            out.push_str(value);
            copied = range.end;
        }
    }
    out.push_str(&arg[copied..]);
    out
}

/// An executable the package exposes, relative to the environment prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Location inside the environment, e.g. `bin/demo`.
    pub path: PathBuf,
    /// Name of the link placed in the shared bin directory.
    pub link_name: String,
}

impl EntryPoint {
    /// A bare name `demo` means `bin/demo`; anything with a separator is taken
    /// relative to the environment prefix.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            bail!("entry point must not be empty");
        }

        let path = if spec.contains('/') {
            PathBuf::from(spec)
        } else {
            Path::new("bin").join(spec)
        };

        if !path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!(
                "entry point '{}' must be a relative path inside the environment",
                spec
            );
        }

        let link_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("entry point '{}' has no file name", spec))?;

        Ok(Self { path, link_name })
    }
}

/// Post-install verification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SmokeTest {
    /// Entry point link name to invoke. Defaults to the first entry point.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default = "default_test_args")]
    pub args: Vec<String>,

    /// Substring that must appear in the combined output.
    #[serde(default)]
    pub expect: Option<String>,
}

impl Default for SmokeTest {
    fn default() -> Self {
        Self {
            command: None,
            args: default_test_args(),
            expect: None,
        }
    }
}

fn default_test_args() -> Vec<String> {
    vec!["--help".to_string()]
}
