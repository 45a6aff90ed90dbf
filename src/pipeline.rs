use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::header::{BinaryHeaderReader, HeaderReader};
use crate::incremental::find_up_to_date_artifacts;
use crate::journal::{LOG_PREFIX, RunLog};
use crate::options::{OptionsInput, RunOptions};
use crate::project::ProjectView;
use crate::rotation::LogRotator;
use crate::runner::{CompilerRunner, ProcessRunner};
use crate::scheduler::{BatchTally, CancellationToken, ExecutionStrategy, TaskScheduler};
use crate::stages::{Anonymizer, ArchivePackager, HeaderAnonymizer, Packager};
use crate::stats::{RunStats, log_snapshot};

/// External capabilities the orchestrator drives.
pub struct Collaborators {
    pub runner: Box<dyn ProcessRunner>,
    pub header_reader: Box<dyn HeaderReader>,
    pub anonymizer: Box<dyn Anonymizer>,
    pub packager: Box<dyn Packager>,
}

impl Collaborators {
    pub fn defaults(package_name: &str) -> Self {
        Self {
            runner: Box::new(CompilerRunner),
            header_reader: Box::new(BinaryHeaderReader),
            anonymizer: Box::new(HeaderAnonymizer),
            packager: Box::new(ArchivePackager::new(package_name)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompileReport {
    pub strategy: ExecutionStrategy,
    pub command_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl From<BatchTally> for CompileReport {
    fn from(tally: BatchTally) -> Self {
        Self {
            strategy: tally.strategy,
            command_count: tally.submitted,
            succeeded: tally.succeeded,
            failed: tally.failed,
            skipped: tally.skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnonymizeOutcome {
    Skipped,
    Completed {
        anonymized: usize,
        missing: usize,
        failed: usize,
    },
}

/// Result of [`PipelineOrchestrator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub compile: CompileReport,
    pub build_time: String,
    pub anonymize: Option<AnonymizeOutcome>,
    pub packages: Vec<PathBuf>,
    pub zip: Option<PathBuf>,
    pub stage_errors: Vec<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.compile.failed == 0 && self.stage_errors.is_empty()
    }
}

#[derive(Serialize)]
struct OptionsRecord<'a> {
    input: &'a OptionsInput,
    resolved: &'a RunOptions,
}

pub struct PipelineOrchestrator {
    project: Box<dyn ProjectView>,
    collaborators: Collaborators,
    scheduler: TaskScheduler,
    stats: RunStats,
    run_log: Option<RunLog>,
    cancel: CancellationToken,
}

impl PipelineOrchestrator {
    /// Rotates old run logs and opens a new one when a log directory is
    /// configured. Failing to create or write the log is fatal.
    pub fn new(project: Box<dyn ProjectView>, collaborators: Collaborators) -> Result<Self> {
        let options = project.options();
        let scheduler = TaskScheduler::new(options.no_parallel, options.worker_limit);
        let stats = RunStats::new(project.scripts().len());

        let run_log = match &options.log_path {
            Some(dir) => Some(open_run_log(dir, project.as_ref())?),
            None => None,
        };

        Ok(Self {
            project,
            collaborators,
            scheduler,
            stats,
            run_log,
            cancel: CancellationToken::new(),
        })
    }

    pub fn project(&self) -> &dyn ProjectView {
        self.project.as_ref()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn run_log_path(&self) -> Option<&Path> {
        self.run_log.as_ref().map(RunLog::path)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn build_time(&self) -> String {
        self.stats.summary()
    }

    /// Compiles every command the project produces. Individual failures are
    /// counted; only failing to produce the command list or to start the
    /// worker pool is an error.
    #[instrument(skip(self))]
    pub fn compile(&mut self) -> Result<CompileReport> {
        let commands = self
            .project
            .build_commands()
            .context("Failed to build compile commands")?;

        self.stats.begin(commands.len());
        let tally = self
            .scheduler
            .run(self.collaborators.runner.as_ref(), &commands, &self.cancel)?;
        self.stats.record_successes(tally.succeeded);
        self.stats.finish();

        let report = CompileReport::from(tally);
        let snapshot = self.stats.snapshot();
        log_snapshot(&snapshot);
        self.append_record(
            "compile_summary",
            &json!({ "report": report, "stats": snapshot }),
        );
        Ok(report)
    }

    #[instrument(skip(self))]
    pub fn anonymize(&mut self) -> AnonymizeOutcome {
        let project = self.project.as_ref();
        let up_to_date = find_up_to_date_artifacts(
            project.scripts(),
            project.artifact_paths(),
            &project.options().artifact_extension,
            self.collaborators.header_reader.as_ref(),
        );

        if up_to_date.is_empty()
            && project.missing_scripts().is_empty()
            && project.options().incremental_build()
        {
            error!("Cannot anonymize compiled scripts because no source scripts were modified");
            self.append_record(
                "anonymize_skipped",
                &json!({ "reason": "nothing to anonymize because no source changed" }),
            );
            return AnonymizeOutcome::Skipped;
        }

        let mut anonymized = 0usize;
        let mut missing = 0usize;
        let mut failed = 0usize;
        for artifact in project.artifact_paths() {
            if !artifact.is_file() {
                warn!(artifact = %artifact.display(), "Cannot locate file to anonymize");
                missing += 1;
                continue;
            }
            match self.collaborators.anonymizer.anonymize(artifact) {
                Ok(()) => anonymized += 1,
                Err(err) => {
                    error!(artifact = %artifact.display(), error = %format!("{err:#}"), "Failed to anonymize");
                    failed += 1;
                }
            }
        }

        let outcome = AnonymizeOutcome::Completed {
            anonymized,
            missing,
            failed,
        };
        self.append_record("anonymize", &outcome);
        outcome
    }

    #[instrument(skip(self))]
    pub fn pack(&mut self) -> Result<Vec<PathBuf>> {
        let packages = self
            .collaborators
            .packager
            .create_packages(self.project.as_ref())?;
        self.append_record("packages", &packages);
        Ok(packages)
    }

    #[instrument(skip(self))]
    pub fn zip(&mut self) -> Result<PathBuf> {
        let bundle = self.collaborators.packager.create_zip(self.project.as_ref())?;
        self.append_record("zip", &bundle);
        Ok(bundle)
    }

    /// Compiles, then runs whichever post-processing stages the options
    /// request. A failing stage is logged and the remaining stages still run.
    pub fn run(&mut self) -> Result<RunSummary> {
        let compile = self.compile()?;
        let build_time = self.build_time();
        info!("{build_time}");

        let options = self.project.options();
        let (want_anonymize, want_package, want_zip) =
            (options.anonymize, options.package, options.zip);

        let anonymize = want_anonymize.then(|| self.anonymize());

        let mut stage_errors = Vec::new();
        let mut packages = Vec::new();
        if want_package {
            match self.pack() {
                Ok(created) => packages = created,
                Err(err) => {
                    error!(error = %format!("{err:#}"), "Packaging failed");
                    stage_errors.push(format!("pack: {err:#}"));
                }
            }
        }

        let mut zip = None;
        if want_zip {
            match self.zip() {
                Ok(bundle) => zip = Some(bundle),
                Err(err) => {
                    error!(error = %format!("{err:#}"), "Zipping failed");
                    stage_errors.push(format!("zip: {err:#}"));
                }
            }
        }

        Ok(RunSummary {
            compile,
            build_time,
            anonymize,
            packages,
            zip,
            stage_errors,
        })
    }

    fn append_record<T: Serialize>(&mut self, key: &str, value: &T) {
        if let Some(log) = self.run_log.as_mut()
            && let Err(err) = log.record(key, value)
        {
            warn!(key, error = %err, "Failed to append run log record");
        }
    }
}

fn open_run_log(dir: &Path, project: &dyn ProjectView) -> Result<RunLog> {
    let options = project.options();
    let rotation = LogRotator::new(dir, LOG_PREFIX).rotate(options.log_keep);

    let mut log = RunLog::create(dir, LOG_PREFIX)?;
    log.record(
        "options",
        &OptionsRecord {
            input: project.options_input(),
            resolved: options,
        },
    )?;
    log.record("project_data", &project.snapshot())?;
    if !rotation.deleted.is_empty() || !rotation.failed.is_empty() {
        log.record("log_rotation", &rotation)?;
    }
    info!(log = %log.path().display(), "Run log opened");
    Ok(log)
}
