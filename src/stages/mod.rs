use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::project::ProjectView;

pub mod anonymize;
pub mod package;

pub use anonymize::HeaderAnonymizer;
pub use package::ArchivePackager;

/// Scrubs identifying metadata from a compiled artifact in place.
pub trait Anonymizer: Send + Sync {
    fn anonymize(&self, artifact: &Path) -> Result<()>;
}

/// Produces distributable archives from a project's compiled artifacts.
pub trait Packager: Send + Sync {
    fn create_packages(&self, project: &dyn ProjectView) -> Result<Vec<PathBuf>>;
    fn create_zip(&self, project: &dyn ProjectView) -> Result<PathBuf>;
}

/// Artifacts of `project` that currently exist on disk.
pub(crate) fn existing_artifacts(project: &dyn ProjectView) -> Vec<&Path> {
    project
        .artifact_paths()
        .iter()
        .map(PathBuf::as_path)
        .filter(|path| path.is_file())
        .collect()
}
