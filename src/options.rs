use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_LOG_KEEP: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ZipCompression {
    Store,
    #[default]
    Deflate,
}

/// Options exactly as they were supplied by the manifest and command line.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OptionsInput {
    pub log_path: Option<PathBuf>,
    pub log_keep: Option<usize>,
    pub no_parallel: bool,
    pub worker_limit: Option<usize>,
    pub no_incremental_build: bool,
    pub output_path: Option<PathBuf>,
    pub package_path: Option<PathBuf>,
    pub zip_file_name: Option<String>,
    pub zip_compression: Option<ZipCompression>,
    pub anonymize: bool,
    pub package: bool,
    pub zip: bool,
}

impl OptionsInput {
    /// Layers `overrides` on top of `self`; set values and raised flags win.
    pub fn merged_with(&self, overrides: &OptionsInput) -> OptionsInput {
        OptionsInput {
            log_path: overrides.log_path.clone().or_else(|| self.log_path.clone()),
            log_keep: overrides.log_keep.or(self.log_keep),
            no_parallel: self.no_parallel || overrides.no_parallel,
            worker_limit: overrides.worker_limit.or(self.worker_limit),
            no_incremental_build: self.no_incremental_build || overrides.no_incremental_build,
            output_path: overrides
                .output_path
                .clone()
                .or_else(|| self.output_path.clone()),
            package_path: overrides
                .package_path
                .clone()
                .or_else(|| self.package_path.clone()),
            zip_file_name: overrides
                .zip_file_name
                .clone()
                .or_else(|| self.zip_file_name.clone()),
            zip_compression: overrides.zip_compression.or(self.zip_compression),
            anonymize: self.anonymize || overrides.anonymize,
            package: self.package || overrides.package,
            zip: self.zip || overrides.zip,
        }
    }
}

/// Fully resolved, immutable options for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOptions {
    pub log_path: Option<PathBuf>,
    pub log_keep: usize,
    pub no_parallel: bool,
    pub worker_limit: usize,
    pub no_incremental_build: bool,
    pub output_path: PathBuf,
    pub package_path: PathBuf,
    pub zip_file_name: String,
    pub zip_compression: ZipCompression,
    pub anonymize: bool,
    pub package: bool,
    pub zip: bool,
    pub artifact_extension: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub project_dir: &'a Path,
    pub project_name: &'a str,
    pub artifact_extension: &'a str,
}

type Resolver = fn(&OptionsInput, &ResolveContext<'_>, &mut RunOptions) -> Result<()>;

const RESOLVERS: &[(&str, Resolver)] = &[
    ("log_path", resolve_log_path),
    ("log_keep", resolve_log_keep),
    ("worker_limit", resolve_worker_limit),
    ("output_path", resolve_output_path),
    ("package_path", resolve_package_path),
    ("zip_file_name", resolve_zip_file_name),
];

impl RunOptions {
    pub fn resolve(input: &OptionsInput, ctx: &ResolveContext<'_>) -> Result<Self> {
        let mut options = RunOptions {
            log_path: None,
            log_keep: DEFAULT_LOG_KEEP,
            no_parallel: input.no_parallel,
            worker_limit: 1,
            no_incremental_build: input.no_incremental_build,
            output_path: ctx.project_dir.to_path_buf(),
            package_path: ctx.project_dir.to_path_buf(),
            zip_file_name: String::new(),
            zip_compression: input.zip_compression.unwrap_or_default(),
            anonymize: input.anonymize,
            package: input.package,
            zip: input.zip,
            artifact_extension: ctx.artifact_extension.to_string(),
        };

        for (name, resolver) in RESOLVERS {
            resolver(input, ctx, &mut options)
                .with_context(|| format!("Failed to resolve option '{name}'"))?;
            debug!(option = *name, "Option resolved");
        }

        Ok(options)
    }

    pub fn incremental_build(&self) -> bool {
        !self.no_incremental_build
    }
}

fn resolve_log_path(
    input: &OptionsInput,
    ctx: &ResolveContext<'_>,
    options: &mut RunOptions,
) -> Result<()> {
    options.log_path = input
        .log_path
        .as_deref()
        .map(|path| absolutize(ctx.project_dir, path));
    Ok(())
}

fn resolve_log_keep(
    input: &OptionsInput,
    _ctx: &ResolveContext<'_>,
    options: &mut RunOptions,
) -> Result<()> {
    options.log_keep = match input.log_keep {
        Some(0) => bail!("log_keep must be at least 1"),
        Some(keep) => keep,
        None => DEFAULT_LOG_KEEP,
    };
    Ok(())
}

fn resolve_worker_limit(
    input: &OptionsInput,
    _ctx: &ResolveContext<'_>,
    options: &mut RunOptions,
) -> Result<()> {
    options.worker_limit = match input.worker_limit {
        Some(0) => bail!("worker_limit must be a positive integer"),
        Some(limit) => limit,
        None => thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    };
    Ok(())
}

fn resolve_output_path(
    input: &OptionsInput,
    ctx: &ResolveContext<'_>,
    options: &mut RunOptions,
) -> Result<()> {
    options.output_path = match input.output_path.as_deref() {
        Some(path) => absolutize(ctx.project_dir, path),
        None => ctx.project_dir.join("out"),
    };
    Ok(())
}

fn resolve_package_path(
    input: &OptionsInput,
    ctx: &ResolveContext<'_>,
    options: &mut RunOptions,
) -> Result<()> {
    options.package_path = match input.package_path.as_deref() {
        Some(path) => absolutize(ctx.project_dir, path),
        None => ctx.project_dir.join("dist"),
    };
    Ok(())
}

fn resolve_zip_file_name(
    input: &OptionsInput,
    ctx: &ResolveContext<'_>,
    options: &mut RunOptions,
) -> Result<()> {
    let name = match input.zip_file_name.as_deref().map(str::trim) {
        Some("") => bail!("zip_file_name cannot be empty"),
        Some(name) => name.to_string(),
        None => ctx.project_name.to_string(),
    };
    options.zip_file_name = if name.to_ascii_lowercase().ends_with(".zip") {
        name
    } else {
        format!("{name}.zip")
    };
    Ok(())
}

pub(crate) fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
