use crate::archive::ArchiveExtractor;
use crate::deps::DependencyProvider;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::installer::{Installer, UninstallOutcome};
use crate::runtime::Runtime;

/// Remove an installed package, asking first unless `yes` is set.
#[tracing::instrument(skip(installer))]
pub fn uninstall<R, F, D, E>(installer: &Installer<R, F, D, E>, name: &str, yes: bool) -> Result<()>
where
    R: Runtime + 'static,
    F: Fetcher,
    D: DependencyProvider,
    E: ArchiveExtractor,
{
    match installer.uninstall(name, yes)? {
        UninstallOutcome::Removed { links } => {
            log::debug!("Removed {} link(s) of {}", links, name);
        }
        UninstallOutcome::Cancelled => println!("Uninstall cancelled."),
    }
    Ok(())
}
