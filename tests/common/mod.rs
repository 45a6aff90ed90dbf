#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};
use scriptsmith::header::{
    ArtifactHeader, ByteOrder, HeaderError, HeaderReader, StringSpan, encode_header,
};
use scriptsmith::options::{OptionsInput, ResolveContext, RunOptions};
use scriptsmith::project::{ProjectSnapshot, ProjectView, SourceScript, derive_artifact_paths};
use scriptsmith::runner::{CompileCommand, ProcessOutcome, ProcessRunner};
use scriptsmith::stages::{Anonymizer, Packager};

pub fn at_secs(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

pub fn set_modified(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .expect("open for mtime")
        .set_modified(time)
        .expect("set mtime");
}

pub fn header_compiled_at(secs: u64) -> ArtifactHeader {
    ArtifactHeader {
        byte_order: ByteOrder::Big,
        major_version: 3,
        minor_version: 2,
        game_id: 1,
        compilation_time: secs,
        source_file_name: "Quest.psc".into(),
        user_name: "builder".into(),
        machine_name: "WORKSTATION".into(),
        user_name_span: StringSpan { offset: 0, len: 0 },
        machine_name_span: StringSpan { offset: 0, len: 0 },
    }
}

/// Writes a real artifact whose header claims it was compiled at `secs`.
pub fn write_artifact(path: &Path, secs: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut bytes = encode_header(&header_compiled_at(secs));
    bytes.extend_from_slice(b"body");
    fs::write(path, bytes).unwrap();
}

/// Resolves options against `dir` the same way a manifest-backed project does.
pub fn options_in(dir: &Path, input: &OptionsInput) -> RunOptions {
    RunOptions::resolve(
        input,
        &ResolveContext {
            project_dir: dir,
            project_name: "quests",
            artifact_extension: "pex",
        },
    )
    .unwrap()
}

/// In-memory project: scripts are created on disk, everything else is fixed.
pub struct FakeProject {
    pub input: OptionsInput,
    pub options: RunOptions,
    pub scripts: Vec<SourceScript>,
    pub artifacts: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

impl FakeProject {
    pub fn new(dir: &Path, stems: &[&str], input: OptionsInput) -> Self {
        let options = options_in(dir, &input);
        let source_dir = dir.join("src");
        fs::create_dir_all(&source_dir).unwrap();
        let scripts: Vec<SourceScript> = stems
            .iter()
            .map(|stem| {
                let path = source_dir.join(format!("{stem}.psc"));
                fs::write(&path, format!("ScriptName {stem}\n")).unwrap();
                SourceScript::new(path, at_secs(1_000))
            })
            .collect();
        let artifacts = derive_artifact_paths(
            scripts.iter().map(SourceScript::path),
            &options.output_path,
            &options.artifact_extension,
        );
        Self {
            input,
            options,
            scripts,
            artifacts,
            missing: Vec::new(),
        }
    }

    pub fn with_missing(mut self, path: impl Into<PathBuf>) -> Self {
        self.missing.push(path.into());
        self
    }
}

impl ProjectView for FakeProject {
    fn options(&self) -> &RunOptions {
        &self.options
    }

    fn options_input(&self) -> &OptionsInput {
        &self.input
    }

    fn scripts(&self) -> &[SourceScript] {
        &self.scripts
    }

    fn artifact_paths(&self) -> &[PathBuf] {
        &self.artifacts
    }

    fn missing_scripts(&self) -> &[PathBuf] {
        &self.missing
    }

    fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            program_path: PathBuf::from("compiler"),
            project_path: PathBuf::from("quests.yaml"),
            import_paths: Vec::new(),
            script_paths: self.scripts.iter().map(|s| s.path().to_path_buf()).collect(),
            artifact_paths: self.artifacts.clone(),
        }
    }

    fn build_commands(&self) -> Result<Vec<CompileCommand>> {
        Ok(self
            .scripts
            .iter()
            .map(|script| {
                let label = script
                    .path()
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                CompileCommand::new(label, "compiler").arg(script.path().as_os_str())
            })
            .collect())
    }
}

/// Fails every command whose label is listed; records what ran.
#[derive(Default)]
pub struct LabelRunner {
    failing: HashSet<String>,
    pub ran: Arc<Mutex<Vec<String>>>,
}

impl LabelRunner {
    pub fn failing(labels: &[&str]) -> Self {
        Self {
            failing: labels.iter().map(|label| label.to_string()).collect(),
            ran: Arc::default(),
        }
    }
}

impl ProcessRunner for LabelRunner {
    fn run(&self, command: &CompileCommand) -> ProcessOutcome {
        self.ran.lock().unwrap().push(command.label.clone());
        if self.failing.contains(&command.label) {
            ProcessOutcome::Failure
        } else {
            ProcessOutcome::Success
        }
    }
}

/// Header reader backed by a table of compile times; unknown paths report an
/// unrecognized format marker.
#[derive(Default)]
pub struct TableReader {
    times: HashMap<PathBuf, u64>,
}

impl TableReader {
    pub fn with(mut self, path: impl Into<PathBuf>, secs: u64) -> Self {
        self.times.insert(path.into(), secs);
        self
    }
}

impl HeaderReader for TableReader {
    fn read_header(&self, path: &Path) -> Result<ArtifactHeader, HeaderError> {
        match self.times.get(path) {
            Some(secs) => Ok(header_compiled_at(*secs)),
            None => Err(HeaderError::UnknownMagic {
                path: path.to_path_buf(),
                magic: [0, 0, 0, 0],
            }),
        }
    }
}

#[derive(Default, Clone)]
pub struct RecordingAnonymizer {
    pub touched: Arc<Mutex<Vec<PathBuf>>>,
}

impl Anonymizer for RecordingAnonymizer {
    fn anonymize(&self, artifact: &Path) -> Result<()> {
        self.touched.lock().unwrap().push(artifact.to_path_buf());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct RecordingPackager {
    pub fail: bool,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Packager for RecordingPackager {
    fn create_packages(&self, _project: &dyn ProjectView) -> Result<Vec<PathBuf>> {
        self.calls.lock().unwrap().push("packages");
        if self.fail {
            bail!("packaging tool unavailable");
        }
        Ok(vec![PathBuf::from("dist/quests.tar")])
    }

    fn create_zip(&self, _project: &dyn ProjectView) -> Result<PathBuf> {
        self.calls.lock().unwrap().push("zip");
        if self.fail {
            bail!("zip tool unavailable");
        }
        Ok(PathBuf::from("dist/quests.zip"))
    }
}
