use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use scriptsmith::header::BinaryHeaderReader;
use scriptsmith::incremental::find_up_to_date_artifacts;
use scriptsmith::manifest::Manifest;
use scriptsmith::options::{OptionsInput, ZipCompression};
use scriptsmith::pipeline::{Collaborators, PipelineOrchestrator};
use scriptsmith::project::ProjectView;
use scriptsmith::validation::validate_manifest;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Build { manifest, options } => build(manifest, options),
        Commands::Validate { manifest } => validate(manifest),
        Commands::Status {
            manifest,
            output_path,
        } => status(manifest, output_path),
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn build(manifest_path: PathBuf, flags: BuildFlags) -> Result<()> {
    let manifest = Manifest::load(&manifest_path)?;
    let report = validate_manifest(&manifest);
    for warning in &report.warnings {
        warn!(file = %manifest_path.display(), "{warning}");
    }
    if !report.is_ok() {
        for error_msg in &report.errors {
            error!(file = %manifest_path.display(), "{error_msg}");
        }
        bail!(
            "Manifest validation failed with {} error(s)",
            report.errors.len()
        );
    }

    let project = manifest.resolve(
        &manifest_path,
        &flags.into_options(),
        Box::new(BinaryHeaderReader),
    )?;
    let collaborators = Collaborators::defaults(project.name());
    let mut orchestrator = PipelineOrchestrator::new(Box::new(project), collaborators)?;

    let summary = orchestrator.run()?;
    println!("{}", summary.build_time);

    if let Some(path) = orchestrator.run_log_path() {
        info!(log = %path.display(), "Run log written");
    }

    if summary.is_success() {
        Ok(())
    } else {
        bail!(
            "Build finished with {} failed command(s) and {} stage error(s)",
            summary.compile.failed,
            summary.stage_errors.len()
        )
    }
}

fn validate(manifest_path: PathBuf) -> Result<()> {
    let manifest = Manifest::load(&manifest_path)?;
    let report = validate_manifest(&manifest);

    for warning in &report.warnings {
        warn!(file = %manifest_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %manifest_path.display(), "Manifest validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %manifest_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Manifest validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn status(manifest_path: PathBuf, output_path: Option<PathBuf>) -> Result<()> {
    let manifest = Manifest::load(&manifest_path)?;
    let overrides = OptionsInput {
        output_path,
        ..OptionsInput::default()
    };
    let project = manifest.resolve(
        &manifest_path,
        &overrides,
        Box::new(BinaryHeaderReader),
    )?;

    let up_to_date = find_up_to_date_artifacts(
        project.scripts(),
        project.artifact_paths(),
        &project.options().artifact_extension,
        project.header_reader(),
    );

    for artifact in project.artifact_paths() {
        let state = if up_to_date.contains(artifact) {
            "up-to-date"
        } else if artifact.is_file() {
            "stale"
        } else {
            "missing"
        };
        println!("{state:<10} {}", artifact.display());
    }
    for script in project.missing_scripts() {
        println!("{:<10} {}", "no-source", script.display());
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "scriptsmith",
    version,
    about = "Incremental, parallel build orchestrator for compiled script projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the project, then run the requested post-processing stages
    Build {
        manifest: PathBuf,
        #[command(flatten)]
        options: BuildFlags,
    },
    /// Check a manifest without building
    Validate { manifest: PathBuf },
    /// Show which compiled artifacts are up to date
    Status {
        manifest: PathBuf,
        #[arg(long = "output-path")]
        output_path: Option<PathBuf>,
    },
}

#[derive(Args)]
struct BuildFlags {
    #[arg(long = "log-path")]
    log_path: Option<PathBuf>,
    #[arg(long = "log-keep")]
    log_keep: Option<usize>,
    #[arg(long)]
    no_parallel: bool,
    #[arg(long = "worker-limit")]
    worker_limit: Option<usize>,
    #[arg(long)]
    no_incremental_build: bool,
    #[arg(long = "output-path")]
    output_path: Option<PathBuf>,
    #[arg(long = "package-path")]
    package_path: Option<PathBuf>,
    #[arg(long = "zip-file-name")]
    zip_file_name: Option<String>,
    #[arg(long = "zip-compression", value_enum)]
    zip_compression: Option<ZipCompression>,
    #[arg(long)]
    anonymize: bool,
    #[arg(long)]
    package: bool,
    #[arg(long)]
    zip: bool,
}

impl BuildFlags {
    fn into_options(self) -> OptionsInput {
        OptionsInput {
            log_path: self.log_path,
            log_keep: self.log_keep,
            no_parallel: self.no_parallel,
            worker_limit: self.worker_limit,
            no_incremental_build: self.no_incremental_build,
            output_path: self.output_path,
            package_path: self.package_path,
            zip_file_name: self.zip_file_name,
            zip_compression: self.zip_compression,
            anonymize: self.anonymize,
            package: self.package,
            zip: self.zip,
        }
    }
}
