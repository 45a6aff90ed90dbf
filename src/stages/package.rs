use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tar::Builder;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::options::ZipCompression;
use crate::project::ProjectView;

use super::{Packager, existing_artifacts};

/// Writes a tar package and a zip bundle of the compiled artifacts into the
/// project's package directory.
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    package_name: String,
}

impl ArchivePackager {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
        }
    }
}

impl Packager for ArchivePackager {
    fn create_packages(&self, project: &dyn ProjectView) -> Result<Vec<PathBuf>> {
        let artifacts = existing_artifacts(project);
        if artifacts.is_empty() {
            bail!("No compiled artifacts available to package");
        }

        let dir = &project.options().package_path;
        ensure_dir(dir)?;
        let path = dir.join(format!("{}.tar", self.package_name));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create package: {}", path.display()))?;

        let mut builder = Builder::new(file);
        for artifact in &artifacts {
            let name = entry_name(artifact)?;
            builder
                .append_path_with_name(artifact, &name)
                .with_context(|| format!("Failed to add {} to package", artifact.display()))?;
        }
        builder
            .finish()
            .with_context(|| format!("Failed to finalize package: {}", path.display()))?;

        info!(package = %path.display(), files = artifacts.len(), "Package created");
        Ok(vec![path])
    }

    fn create_zip(&self, project: &dyn ProjectView) -> Result<PathBuf> {
        let artifacts = existing_artifacts(project);
        if artifacts.is_empty() {
            bail!("No compiled artifacts available to zip");
        }

        let options = project.options();
        ensure_dir(&options.package_path)?;
        let path = options.package_path.join(&options.zip_file_name);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create zip file: {}", path.display()))?;

        let mut zip = ZipWriter::new(file);
        let file_options = zip_file_options(options.zip_compression);
        for artifact in &artifacts {
            let name = entry_name(artifact)?;
            zip.start_file(name.as_str(), file_options)
                .with_context(|| format!("Failed to start {name} in zip"))?;
            let mut source = File::open(artifact)
                .with_context(|| format!("Failed to open {}", artifact.display()))?;
            io::copy(&mut source, &mut zip)
                .with_context(|| format!("Failed to write {name} to zip"))?;
        }
        zip.finish()
            .with_context(|| format!("Failed to finalize zip archive: {}", path.display()))?;

        info!(zip = %path.display(), files = artifacts.len(), "Zip created");
        Ok(path)
    }
}

fn zip_file_options(compression: ZipCompression) -> FileOptions {
    match compression {
        ZipCompression::Store => FileOptions::default().compression_method(CompressionMethod::Stored),
        ZipCompression::Deflate => {
            FileOptions::default().compression_method(CompressionMethod::Deflated)
        }
    }
}

fn entry_name(artifact: &Path) -> Result<String> {
    match artifact.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => bail!("Invalid artifact path: {}", artifact.display()),
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create package directory: {}", dir.display()))
}
