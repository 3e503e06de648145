use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::Path;
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, enclosed_join, extract_stripped};

/// Extractor for .tar.gz and .tgz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting tar.gz archive to {:?}...", extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        extract_stripped(runtime, extract_to, |temp_dir| {
            let mut archive = Archive::new(GzDecoder::new(file));
            let entries = archive
                .entries()
                .context("Failed to read tar.gz archive")?;

            for entry in entries {
                let mut entry = entry.context("Failed to read tar entry")?;
                let entry_path = entry
                    .path()
                    .context("Tar entry has an invalid path")?
                    .into_owned();
                let full_path = enclosed_join(temp_dir, &entry_path)?;
                if full_path == temp_dir {
                    continue;
                }

                match entry.header().entry_type() {
                    EntryType::Directory => runtime.create_dir_all(&full_path)?,
                    EntryType::Regular | EntryType::Continuous => {
                        if let Some(parent) = full_path.parent() {
                            runtime.create_dir_all(parent)?;
                        }
                        let mut dest_file = runtime.create_file(&full_path)?;
                        std::io::copy(&mut entry, &mut dest_file)
                            .with_context(|| format!("Failed to extract file {:?}", full_path))?;
                        drop(dest_file);

                        #[cfg(unix)]
                        if let Ok(mode) = entry.header().mode()
                            && let Err(e) = runtime.set_permissions(&full_path, mode & 0o7777)
                        {
                            debug!("Failed to set permissions on {:?}: {}", full_path, e);
                        }
                    }
                    EntryType::Symlink => {
                        let Some(target) = entry.link_name().context("Invalid symlink target")?
                        else {
                            continue;
                        };
                        if let Some(parent) = full_path.parent() {
                            runtime.create_dir_all(parent)?;
                        }
                        runtime.symlink(&target, &full_path)?;
                    }
                    EntryType::Link => {
                        let Some(target) = entry.link_name().context("Invalid hard link target")?
                        else {
                            continue;
                        };
                        let source = enclosed_join(temp_dir, &target)?;
                        runtime.copy(&source, &full_path).with_context(|| {
                            format!("Failed to materialise hard link {:?}", full_path)
                        })?;
                    }
                    other => debug!("Skipping {:?} entry {:?}", other, entry_path),
                }
            }
            Ok(())
        })?;

        info!("Extraction complete.");
        Ok(())
    }
}
