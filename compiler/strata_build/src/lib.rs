//! Strata Build - keeps compiled artifacts in step with their sources.
//!
//! Sources under the module tree are compiled to JSON artifacts by an
//! [`ExternalCompiler`]. [`Pipeline::build`] recompiles everything stale in
//! bounded-concurrency batches; [`Pipeline::ensure_fresh`] refreshes one
//! source on demand.

mod compiler;
mod errors;
mod layout;
mod pipeline;
mod scan;

pub use compiler::{CommandCompiler, ExternalCompiler};
pub use errors::{BuildError, CompileError};
pub use layout::{ArtifactLayout, ARTIFACT_EXTENSION, SOURCE_EXTENSION};
pub use pipeline::{BuildReport, Pipeline, PipelineConfig, Progress, DEFAULT_BATCH_SIZE};
pub use scan::{plan, scan_tree, BuildPlan, Job, TreeScan};
