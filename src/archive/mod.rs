mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use std::path::{Component, Path, PathBuf};

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Trait for format-specific archive extractors
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive to the specified directory.
    /// A single top-level directory inside the archive is stripped.
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()>;
}

/// Dispatcher that selects the appropriate extractor based on archive format.
pub struct ArchiveExtractorImpl {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            tar_gz: TarGzExtractor,
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime, archive_path, extract_to))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        if self.tar_gz.can_handle(archive_path) {
            return self.tar_gz.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// Join an archive member path onto `base`, refusing anything that would land outside it.
pub(crate) fn enclosed_join(base: &Path, member: &Path) -> Result<PathBuf> {
    let mut joined = base.to_path_buf();
    for component in member.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => bail!("archive entry {:?} escapes the extraction directory", member),
        }
    }
    Ok(joined)
}

/// Unpack through `unpack` into a scratch directory next to `extract_to`, then move
/// the contents into `extract_to`. A lone top-level directory is descended into.
pub(crate) fn extract_stripped<R, F>(runtime: &R, extract_to: &Path, unpack: F) -> Result<()>
where
    R: Runtime,
    F: FnOnce(&Path) -> Result<()>,
{
    let dir_name = extract_to
        .file_name()
        .ok_or_else(|| anyhow!("Invalid extraction directory {:?}", extract_to))?;
    let temp_extract_dir =
        extract_to.with_file_name(format!("{}_temp_extract", dir_name.to_string_lossy()));
    if runtime.exists(&temp_extract_dir) {
        runtime.remove_dir_all(&temp_extract_dir)?;
    }
    runtime.create_dir_all(&temp_extract_dir)?;
    runtime.create_dir_all(extract_to)?;

    debug!("Unpacking to temp dir: {:?}", temp_extract_dir);
    let result = unpack(&temp_extract_dir).and_then(|()| {
        let entries = runtime
            .read_dir(&temp_extract_dir)
            .context("Failed to read temp extraction directory")?;

        let Some(first) = entries.first() else {
            bail!("Archive appears to be empty.");
        };
        let source_dir = if entries.len() == 1 && runtime.is_dir(first) && !runtime.is_symlink(first)
        {
            first.clone()
        } else {
            temp_extract_dir.clone()
        };

        debug!("Moving contents from {:?} to {:?}", source_dir, extract_to);
        for item in runtime.read_dir(&source_dir)? {
            let Some(name) = item.file_name() else {
                continue;
            };
            runtime.rename(&item, &extract_to.join(name))?;
        }
        Ok(())
    });

    if let Err(e) = runtime.remove_dir_all(&temp_extract_dir) {
        debug!("Failed to remove {:?}: {}", temp_extract_dir, e);
    }
    result
}
