use anyhow::{Context, Result};
use log::info;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::http::HttpClient;
use crate::runtime::Runtime;

const USER_AGENT: &str = concat!("isopkg/", env!("ISOPKG_VERSION"));

/// Where packages go and how long a fetch may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub install_root: PathBuf,
    pub bin_dir: PathBuf,
    pub fetch_timeout: Duration,
}

impl Config {
    /// Fill in defaults for anything not given on the command line or in the environment.
    #[tracing::instrument(skip(runtime))]
    pub fn resolve<R: Runtime>(
        runtime: &R,
        install_root: Option<PathBuf>,
        bin_dir: Option<PathBuf>,
        fetch_timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let install_root = match install_root {
            Some(path) => absolute(&path)?,
            None => default_install_root(runtime)?,
        };
        let bin_dir = match bin_dir {
            Some(path) => absolute(&path)?,
            None => install_root.join("bin"),
        };
        info!(
            "Using install root {} and bin dir {}",
            install_root.display(),
            bin_dir.display()
        );

        Ok(Self {
            install_root,
            bin_dir,
            fetch_timeout: fetch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT),
        })
    }
}

/// Install steps run inside the staging directory, so every configured path must be absolute.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Failed to resolve {:?}", path))
}

/// HTTP client shared by every fetch.
pub fn build_http_client() -> Result<HttpClient> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    Ok(HttpClient::new(client))
}

/// Get the default installation root directory
#[tracing::instrument(skip(runtime))]
pub fn default_install_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_install_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory; pass --root")?;
        Ok(home_dir.join(".isopkg"))
    }
}

#[cfg(target_os = "macos")]
fn system_install_root() -> PathBuf {
    PathBuf::from("/opt/isopkg")
}

#[cfg(target_os = "windows")]
fn system_install_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\isopkg")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_install_root() -> PathBuf {
    PathBuf::from("/usr/local/isopkg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use crate::test_utils::{configure_mock_runtime_basics, test_root};

    #[test]
    fn test_resolve_defaults_to_home() {
        let mut runtime = MockRuntime::new();
        configure_mock_runtime_basics(&mut runtime);

        let config = Config::resolve(&runtime, None, None, None).unwrap();

        assert_eq!(config.install_root, test_root());
        assert_eq!(config.bin_dir, test_root().join("bin"));
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
    }

    #[test]
    fn test_resolve_with_explicit_values() {
        // Explicit root bypasses home and privilege lookups
        let runtime = MockRuntime::new();

        let config = Config::resolve(
            &runtime,
            Some(PathBuf::from("/srv/isopkg")),
            Some(PathBuf::from("/usr/local/bin")),
            Some(30),
        )
        .unwrap();

        assert_eq!(config.install_root, PathBuf::from("/srv/isopkg"));
        assert_eq!(config.bin_dir, PathBuf::from("/usr/local/bin"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_resolve_makes_relative_paths_absolute() {
        let runtime = MockRuntime::new();
        let cwd = std::env::current_dir().unwrap();

        let config = Config::resolve(&runtime, Some(PathBuf::from("relroot")), None, None).unwrap();
        assert_eq!(config.install_root, cwd.join("relroot"));
        assert_eq!(config.bin_dir, cwd.join("relroot").join("bin"));

        let config = Config::resolve(
            &runtime,
            Some(PathBuf::from("relroot")),
            Some(PathBuf::from("shims")),
            None,
        )
        .unwrap();
        assert!(config.bin_dir.is_absolute());
        assert_eq!(config.bin_dir, cwd.join("shims"));
    }

    #[test]
    fn test_default_install_root_no_home() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime.expect_home_dir().returning(|| None);

        let err = default_install_root(&runtime).unwrap_err();
        assert!(err.to_string().contains("--root"));
    }

    #[test]
    fn test_default_install_root_privileged() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| true);

        let root = default_install_root(&runtime).unwrap();

        #[cfg(target_os = "macos")]
        assert_eq!(root, PathBuf::from("/opt/isopkg"));
        #[cfg(all(unix, not(target_os = "macos")))]
        assert_eq!(root, PathBuf::from("/usr/local/isopkg"));
        #[cfg(target_os = "windows")]
        assert_eq!(root, PathBuf::from("C:\\ProgramData\\isopkg"));
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client().is_ok());
    }
}
