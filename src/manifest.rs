use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use glob::glob;
use serde::Deserialize;
use tracing::warn;

use crate::header::HeaderReader;
use crate::options::{OptionsInput, ResolveContext, RunOptions, absolutize};
use crate::project::{CompilerSettings, Project, ProjectParts, SourceScript};

pub const DEFAULT_ARTIFACT_EXTENSION: &str = "pex";

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub compiler: CompilerSpec,
    #[serde(default)]
    pub import_paths: Vec<PathBuf>,
    pub scripts: Vec<String>,
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
    #[serde(default)]
    pub options: OptionsInput,
}

fn default_artifact_extension() -> String {
    DEFAULT_ARTIFACT_EXTENSION.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompilerSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub flags: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Scripts matched by the manifest, plus explicit entries that do not exist.
#[derive(Debug, Default, Clone)]
pub struct ExpandedScripts {
    pub found: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest file: {}", path.display()))?;
        let manifest: Manifest = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest YAML: {}", path.display()))?;
        Ok(manifest)
    }

    pub fn project_name(&self, manifest_path: &Path) -> String {
        self.name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                manifest_path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "project".to_string())
    }

    /// Expands script entries relative to `base_dir`. Glob patterns that match
    /// nothing are reported as warnings; plain paths that do not exist are
    /// collected as missing scripts.
    pub fn expand_scripts(&self, base_dir: &Path) -> Result<ExpandedScripts> {
        let mut expanded = ExpandedScripts::default();
        for entry in &self.scripts {
            let candidate = base_dir.join(entry);
            if !is_glob_pattern(entry) {
                if candidate.is_file() {
                    push_unique(&mut expanded.found, candidate);
                } else {
                    push_unique(&mut expanded.missing, candidate);
                }
                continue;
            }

            let pattern = candidate.to_string_lossy().into_owned();
            let matches =
                glob(&pattern).with_context(|| format!("Invalid glob pattern: {entry}"))?;
            let mut found = false;
            for path in matches {
                let path = path?;
                if path.is_file() {
                    push_unique(&mut expanded.found, path);
                    found = true;
                }
            }
            if !found {
                warn!(pattern = %entry, "No scripts matched pattern");
            }
        }
        Ok(expanded)
    }

    /// Resolves the manifest into a project. `overrides` are layered on top
    /// of the manifest's own options.
    pub fn resolve(
        &self,
        manifest_path: &Path,
        overrides: &OptionsInput,
        header_reader: Box<dyn HeaderReader>,
    ) -> Result<Project> {
        if self.version != 1 {
            bail!("Unsupported manifest version: {}", self.version);
        }

        let base_dir = manifest_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = self.project_name(manifest_path);
        let input = self.options.merged_with(overrides);
        let options = RunOptions::resolve(
            &input,
            &ResolveContext {
                project_dir: base_dir,
                project_name: &name,
                artifact_extension: &self.artifact_extension,
            },
        )?;

        let expanded = self.expand_scripts(base_dir)?;
        let scripts = expanded
            .found
            .iter()
            .map(|path| {
                SourceScript::observe(path)
                    .with_context(|| format!("Failed to read script metadata: {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        for missing in &expanded.missing {
            warn!(script = %missing.display(), "Script listed in manifest does not exist");
        }

        Ok(Project::new(ProjectParts {
            name,
            project_path: manifest_path.to_path_buf(),
            compiler: CompilerSettings {
                program: resolve_program(base_dir, &self.compiler.path),
                flags: self.compiler.flags.clone(),
                extra_args: self.compiler.args.clone(),
            },
            import_paths: self
                .import_paths
                .iter()
                .map(|path| absolutize(base_dir, path))
                .collect(),
            scripts,
            missing_scripts: expanded.missing,
            options_input: input,
            options,
            header_reader,
        }))
    }
}

pub fn is_glob_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// Bare program names are left for `PATH` lookup.
fn resolve_program(base: &Path, program: &Path) -> PathBuf {
    if program.components().count() == 1 && !program.is_absolute() {
        program.to_path_buf()
    } else {
        absolutize(base, program)
    }
}
