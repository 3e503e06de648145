use log::debug;

use crate::archive::ArchiveExtractor;
use crate::deps::DependencyProvider;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::installer::Installer;
use crate::runtime::Runtime;

/// List all installed packages
#[tracing::instrument(skip(installer))]
pub fn list<R, F, D, E>(installer: &Installer<R, F, D, E>) -> Result<()>
where
    R: Runtime + 'static,
    F: Fetcher,
    D: DependencyProvider,
    E: ArchiveExtractor,
{
    debug!("Listing packages from {:?}", installer.config.install_root);

    let receipts = installer.list()?;
    if receipts.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    for receipt in receipts {
        println!("{} {}", receipt.name, receipt.version);
    }
    Ok(())
}
