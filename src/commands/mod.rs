//! CLI-facing commands. Each one wires an [`Installer`] and prints results for humans.

mod install;
mod list;
mod uninstall;

pub use install::{install, load_descriptor};
pub use list::list;
pub use test::test;
pub use uninstall::uninstall;

use crate::archive::ArchiveExtractorImpl;
use crate::config::{Config, build_http_client};
use crate::deps::SearchPathProvider;
use crate::error::Result;
use crate::fetch::ArchiveFetcher;
use crate::installer::Installer;
use crate::runtime::Runtime;

/// Installer backed by the network, the local search path and the built-in extractors.
pub type DefaultInstaller<R> =
    Installer<R, ArchiveFetcher<R>, SearchPathProvider<R>, ArchiveExtractorImpl>;

#[tracing::instrument(skip(runtime))]
pub fn default_installer<R: Runtime + Clone + 'static>(
    runtime: R,
    config: Config,
) -> Result<DefaultInstaller<R>> {
    let fetcher = ArchiveFetcher::new(runtime.clone(), build_http_client()?)
        .with_timeout(config.fetch_timeout);
    let provider = SearchPathProvider::new(runtime.clone(), config.install_root.clone());
    Ok(Installer::new(
        runtime,
        fetcher,
        provider,
        ArchiveExtractorImpl::new(),
        config,
    ))
}
