use std::path::PathBuf;

use scriptsmith::manifest::{CompilerSpec, Manifest};
use scriptsmith::options::OptionsInput;
use scriptsmith::validation::validate_manifest;

fn base_manifest() -> Manifest {
    Manifest {
        version: 1,
        name: Some("quests".into()),
        compiler: CompilerSpec {
            path: PathBuf::from("compiler"),
            flags: None,
            args: Vec::new(),
        },
        import_paths: Vec::new(),
        scripts: vec!["src/*.psc".into()],
        artifact_extension: "pex".into(),
        options: OptionsInput::default(),
    }
}

#[test]
fn valid_manifest_passes() {
    let report = validate_manifest(&base_manifest());
    assert!(report.is_ok(), "errors: {:?}", report.errors);
    assert!(report.warnings.is_empty());
}

#[test]
fn structural_problems_are_errors() {
    let mut manifest = base_manifest();
    manifest.version = 3;
    manifest.compiler.path = PathBuf::new();
    manifest.scripts = Vec::new();

    let report = validate_manifest(&manifest);
    assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
    assert!(report.errors[0].contains("Unsupported manifest version"));
}

#[test]
fn invalid_glob_is_reported_with_its_position() {
    let mut manifest = base_manifest();
    manifest.scripts = vec!["src/Quest.psc".into(), "src/[.psc".into()];

    let report = validate_manifest(&manifest);
    assert!(!report.is_ok());
    assert!(report.errors[0].starts_with("Script entry 2"));
}

#[test]
fn extension_rules() {
    let mut manifest = base_manifest();
    manifest.artifact_extension = ".pex".into();
    let report = validate_manifest(&manifest);
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);

    manifest.artifact_extension = " ".into();
    assert!(!validate_manifest(&manifest).is_ok());
}

#[test]
fn option_values_are_checked() {
    let mut manifest = base_manifest();
    manifest.options = OptionsInput {
        worker_limit: Some(0),
        log_keep: Some(0),
        zip_file_name: Some("  ".into()),
        ..OptionsInput::default()
    };

    let report = validate_manifest(&manifest);
    assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("log_keep has no effect"))
    );
}

#[test]
fn ignored_worker_limit_is_a_warning() {
    let mut manifest = base_manifest();
    manifest.options = OptionsInput {
        no_parallel: true,
        worker_limit: Some(4),
        ..OptionsInput::default()
    };

    let report = validate_manifest(&manifest);
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
}
