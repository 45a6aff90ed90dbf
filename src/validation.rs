use serde::Serialize;

use crate::manifest::{Manifest, is_glob_pattern};

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_manifest(manifest: &Manifest) -> ValidationReport {
    let mut report = ValidationReport::default();

    if manifest.version != 1 {
        report
            .errors
            .push(format!("Unsupported manifest version: {}", manifest.version));
    }

    if manifest.compiler.path.as_os_str().is_empty() {
        report.errors.push("Compiler path cannot be empty".into());
    }

    if manifest.scripts.is_empty() {
        report
            .errors
            .push("At least one script entry is required".into());
    }

    for (idx, entry) in manifest.scripts.iter().enumerate() {
        if entry.trim().is_empty() {
            report
                .errors
                .push(format!("Script entry {} cannot be empty", idx + 1));
            continue;
        }
        if is_glob_pattern(entry)
            && let Err(err) = glob::Pattern::new(entry)
        {
            report.errors.push(format!(
                "Script entry {} ('{}') is not a valid glob: {}",
                idx + 1,
                entry,
                err
            ));
        }
    }

    report.merge(validate_extension(&manifest.artifact_extension));
    report.merge(validate_options(manifest));
    report
}

fn validate_extension(extension: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    if extension.trim().is_empty() {
        report
            .errors
            .push("Artifact extension cannot be empty".into());
    } else if extension.starts_with('.') {
        report.warnings.push(format!(
            "Artifact extension '{extension}' should not start with a dot"
        ));
    }
    report
}

fn validate_options(manifest: &Manifest) -> ValidationReport {
    let mut report = ValidationReport::default();
    let options = &manifest.options;

    if options.worker_limit == Some(0) {
        report
            .errors
            .push("worker_limit must be a positive integer".into());
    }
    if options.log_keep == Some(0) {
        report.errors.push("log_keep must be at least 1".into());
    }
    if options.log_keep.is_some() && options.log_path.is_none() {
        report
            .warnings
            .push("log_keep has no effect without log_path".into());
    }
    if let Some(name) = &options.zip_file_name
        && name.trim().is_empty()
    {
        report.errors.push("zip_file_name cannot be empty".into());
    }
    if options.no_parallel && options.worker_limit.is_some_and(|limit| limit > 1) {
        report
            .warnings
            .push("worker_limit is ignored when no_parallel is set".into());
    }
    report
}
