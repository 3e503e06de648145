use log::debug;
use std::path::Path;

use crate::archive::ArchiveExtractor;
use crate::deps::DependencyProvider;
use crate::descriptor::PackageDescriptor;
use crate::error::{InstallError, Result};
use crate::fetch::{ArchiveSource, Fetcher};
use crate::installer::{InstallOptions, InstallOutcome, Installer};
use crate::runtime::Runtime;

/// Install the package described by the descriptor file at `descriptor_path`.
#[tracing::instrument(skip(installer))]
pub async fn install<R, F, D, E>(
    installer: &Installer<R, F, D, E>,
    descriptor_path: &Path,
    force: bool,
) -> Result<()>
where
    R: Runtime + 'static,
    F: Fetcher,
    D: DependencyProvider,
    E: ArchiveExtractor,
{
    let descriptor = load_descriptor(&installer.runtime, descriptor_path)?;

    match installer
        .install(&descriptor, InstallOptions { force })
        .await?
    {
        InstallOutcome::Installed(receipt) => {
            for link in &receipt.links {
                println!("   {} -> {}", link.link.display(), link.target.display());
            }
        }
        InstallOutcome::AlreadyInstalled(receipt) => {
            println!(
                "{} {} is already installed (use --force to reinstall)",
                receipt.name, receipt.version
            );
        }
    }
    Ok(())
}

/// Load a descriptor, resolving a relative local `url` against the descriptor's directory.
pub fn load_descriptor<R: Runtime>(runtime: &R, path: &Path) -> Result<PackageDescriptor> {
    let mut descriptor = PackageDescriptor::load(runtime, path).map_err(InstallError::Descriptor)?;

    if let Ok(ArchiveSource::Local(source)) = ArchiveSource::parse(&descriptor.url)
        && source.is_relative()
    {
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        descriptor.url = base.join(source).display().to_string();
        debug!("Resolved local source to {}", descriptor.url);
    }
    Ok(descriptor)
}
