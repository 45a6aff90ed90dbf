pub mod header;
pub mod incremental;
pub mod journal;
pub mod manifest;
pub mod options;
pub mod pipeline;
pub mod project;
pub mod rotation;
pub mod runner;
pub mod scheduler;
pub mod stages;
pub mod stats;
pub mod validation;

pub use manifest::Manifest;
pub use pipeline::{Collaborators, CompileReport, PipelineOrchestrator, RunSummary};
pub use project::{Project, ProjectView, SourceScript};
