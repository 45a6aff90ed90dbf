use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::header::HeaderReader;
use crate::incremental::{find_up_to_date_artifacts, match_artifact};
use crate::options::{OptionsInput, RunOptions};
use crate::runner::CompileCommand;

/// A source file and the modification time observed when the project was
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceScript {
    path: PathBuf,
    modified: SystemTime,
}

impl SourceScript {
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    pub fn observe(path: &Path) -> io::Result<Self> {
        let modified = fs::metadata(path)?.modified()?;
        Ok(Self::new(path, modified))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }
}

/// Everything the run log records about the project at startup.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSnapshot {
    pub program_path: PathBuf,
    pub project_path: PathBuf,
    pub import_paths: Vec<PathBuf>,
    pub script_paths: Vec<PathBuf>,
    pub artifact_paths: Vec<PathBuf>,
}

/// Read-only view of a resolved project.
pub trait ProjectView: Send + Sync {
    fn options(&self) -> &RunOptions;
    /// The unresolved options the run was started with.
    fn options_input(&self) -> &OptionsInput;
    fn scripts(&self) -> &[SourceScript];
    /// Deduplicated artifact paths, including ones not compiled yet.
    fn artifact_paths(&self) -> &[PathBuf];
    fn missing_scripts(&self) -> &[PathBuf];
    fn snapshot(&self) -> ProjectSnapshot;
    fn build_commands(&self) -> Result<Vec<CompileCommand>>;
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub program: PathBuf,
    pub flags: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

/// Project resolved from a manifest on disk.
pub struct Project {
    name: String,
    project_path: PathBuf,
    compiler: CompilerSettings,
    import_paths: Vec<PathBuf>,
    scripts: Vec<SourceScript>,
    artifact_paths: Vec<PathBuf>,
    missing_scripts: Vec<PathBuf>,
    options_input: OptionsInput,
    options: RunOptions,
    header_reader: Box<dyn HeaderReader>,
}

pub struct ProjectParts {
    pub name: String,
    pub project_path: PathBuf,
    pub compiler: CompilerSettings,
    pub import_paths: Vec<PathBuf>,
    pub scripts: Vec<SourceScript>,
    pub missing_scripts: Vec<PathBuf>,
    pub options_input: OptionsInput,
    pub options: RunOptions,
    pub header_reader: Box<dyn HeaderReader>,
}

impl Project {
    pub fn new(parts: ProjectParts) -> Self {
        let artifact_paths = derive_artifact_paths(
            parts
                .scripts
                .iter()
                .map(SourceScript::path)
                .chain(parts.missing_scripts.iter().map(PathBuf::as_path)),
            &parts.options.output_path,
            &parts.options.artifact_extension,
        );
        Self {
            name: parts.name,
            project_path: parts.project_path,
            compiler: parts.compiler,
            import_paths: parts.import_paths,
            scripts: parts.scripts,
            artifact_paths,
            missing_scripts: parts.missing_scripts,
            options_input: parts.options_input,
            options: parts.options,
            header_reader: parts.header_reader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header_reader(&self) -> &dyn HeaderReader {
        self.header_reader.as_ref()
    }

    fn command_for(&self, script: &SourceScript) -> CompileCommand {
        let label = script
            .path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.path().display().to_string());

        let mut command =
            CompileCommand::new(label, &self.compiler.program).arg(script.path().as_os_str());

        if !self.import_paths.is_empty() {
            let joined = self
                .import_paths
                .iter()
                .map(|path| path.to_string_lossy())
                .collect::<Vec<_>>()
                .join(";");
            command = command.arg(format!("-i={joined}"));
        }

        let mut output = OsString::from("-o=");
        output.push(self.options.output_path.as_os_str());
        command = command.arg(output);

        if let Some(flags) = &self.compiler.flags {
            let mut flag_arg = OsString::from("-f=");
            flag_arg.push(flags.as_os_str());
            command = command.arg(flag_arg);
        }

        for arg in &self.compiler.extra_args {
            command = command.arg(arg);
        }
        command
    }
}

impl ProjectView for Project {
    fn options(&self) -> &RunOptions {
        &self.options
    }

    fn options_input(&self) -> &OptionsInput {
        &self.options_input
    }

    fn scripts(&self) -> &[SourceScript] {
        &self.scripts
    }

    fn artifact_paths(&self) -> &[PathBuf] {
        &self.artifact_paths
    }

    fn missing_scripts(&self) -> &[PathBuf] {
        &self.missing_scripts
    }

    fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            program_path: self.compiler.program.clone(),
            project_path: self.project_path.clone(),
            import_paths: self.import_paths.clone(),
            script_paths: self.scripts.iter().map(|s| s.path().to_path_buf()).collect(),
            artifact_paths: self.artifact_paths.clone(),
        }
    }

    /// One command per script, leaving out scripts whose artifact is already
    /// up to date when incremental building is enabled.
    fn build_commands(&self) -> Result<Vec<CompileCommand>> {
        let up_to_date = if self.options.incremental_build() {
            find_up_to_date_artifacts(
                &self.scripts,
                &self.artifact_paths,
                &self.options.artifact_extension,
                self.header_reader(),
            )
        } else {
            Vec::new()
        };

        let mut commands = Vec::with_capacity(self.scripts.len());
        for script in &self.scripts {
            let artifact = match_artifact(
                script.path(),
                &self.artifact_paths,
                &self.options.artifact_extension,
            );
            if let Some(artifact) = artifact
                && up_to_date.contains(artifact)
            {
                debug!(script = %script.path().display(), "Skipping up-to-date script");
                continue;
            }
            commands.push(self.command_for(script));
        }
        Ok(commands)
    }
}

/// `<output_dir>/<stem>.<extension>` for each script, first occurrence kept.
pub fn derive_artifact_paths<'a>(
    scripts: impl IntoIterator<Item = &'a Path>,
    output_dir: &Path,
    extension: &str,
) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for script in scripts {
        let Some(stem) = script.file_stem() else {
            continue;
        };
        let mut file_name = stem.to_os_string();
        file_name.push(".");
        file_name.push(extension);
        let path = output_dir.join(file_name);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}
