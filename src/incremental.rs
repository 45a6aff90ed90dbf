use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::header::{HeaderError, HeaderReader};
use crate::project::SourceScript;

/// Returns the artifacts whose embedded compile time is strictly newer than
/// the modification time of their source script.
///
/// Sources without a matching artifact, artifacts missing on disk and
/// artifacts with an unreadable header are all left out of the result.
pub fn find_up_to_date_artifacts(
    scripts: &[SourceScript],
    artifact_paths: &[PathBuf],
    artifact_extension: &str,
    reader: &dyn HeaderReader,
) -> Vec<PathBuf> {
    let mut up_to_date: Vec<PathBuf> = Vec::new();

    for script in scripts {
        let Some(artifact) = match_artifact(script.path(), artifact_paths, artifact_extension)
        else {
            continue;
        };

        if !artifact.is_file() {
            continue;
        }

        let header = match reader.read_header(artifact) {
            Ok(header) => header,
            Err(HeaderError::UnknownMagic { .. }) => {
                warn!(
                    artifact = %artifact.display(),
                    "Cannot determine compilation time due to unknown magic"
                );
                continue;
            }
            Err(err) => {
                warn!(
                    artifact = %artifact.display(),
                    error = %err,
                    "Cannot determine compilation time"
                );
                continue;
            }
        };

        if script.modified() < header.compiled_at() {
            if !up_to_date.iter().any(|known| known == artifact) {
                up_to_date.push(artifact.clone());
            }
        } else {
            debug!(
                script = %script.path().display(),
                artifact = %artifact.display(),
                "Artifact is stale"
            );
        }
    }

    up_to_date
}

/// First artifact whose path ends in `<script stem>.<extension>`.
pub fn match_artifact<'a>(
    script: &Path,
    artifact_paths: &'a [PathBuf],
    artifact_extension: &str,
) -> Option<&'a PathBuf> {
    let stem = script.file_stem()?.to_string_lossy();
    let suffix = format!("{stem}.{artifact_extension}");
    artifact_paths
        .iter()
        .find(|candidate| candidate.to_string_lossy().ends_with(&suffix))
}
