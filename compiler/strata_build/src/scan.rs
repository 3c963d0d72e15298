//! Staleness detection.
//!
//! An artifact is stale when it is missing or older than the newest file
//! anywhere under the module tree. Every timestamp is collected before any
//! decision is made.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use walkdir::WalkDir;

use crate::errors::BuildError;
use crate::layout::{ArtifactLayout, SOURCE_EXTENSION};

/// One source to compile and the artifact it must produce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Job {
    pub source: PathBuf,
    #[serde(rename = "output")]
    pub artifact: PathBuf,
}

/// Result of walking the module tree.
#[derive(Debug, Default)]
pub struct TreeScan {
    /// Source files, sorted.
    pub sources: Vec<PathBuf>,
    /// Newest modification time of any file in the tree.
    pub latest: Option<SystemTime>,
}

pub fn scan_tree(root: &Path) -> Result<TreeScan, BuildError> {
    let mut scan = TreeScan::default();
    if !root.exists() {
        return Ok(scan);
    }
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| BuildError::Walk {
            root: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| BuildError::Walk {
                root: root.to_path_buf(),
                message: e.to_string(),
            })?
            .modified()
            .map_err(|e| BuildError::io(entry.path(), e))?;
        scan.latest = scan.latest.max(Some(modified));
        if entry.path().extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
            scan.sources.push(entry.into_path());
        }
    }
    scan.sources.sort();
    Ok(scan)
}

/// Modification time of `path`, `None` if it does not exist.
pub(crate) fn modified(path: &Path) -> Result<Option<SystemTime>, BuildError> {
    match std::fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some).map_err(|e| BuildError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BuildError::io(path, e)),
    }
}

pub(crate) fn is_stale(artifact: Option<SystemTime>, latest: Option<SystemTime>) -> bool {
    match (artifact, latest) {
        (None, _) => true,
        (Some(artifact), Some(latest)) => artifact < latest,
        (Some(_), None) => false,
    }
}

/// Stale sources and the tree timestamp they were judged against.
#[derive(Debug, Default)]
pub struct BuildPlan {
    pub jobs: Vec<Job>,
    /// Newest modification time in the tree when the plan was made; a
    /// compiled artifact must be at least this new.
    pub latest: Option<SystemTime>,
}

/// Jobs for every stale source under the layout's module tree.
pub fn plan(layout: &ArtifactLayout) -> Result<BuildPlan, BuildError> {
    let scan = scan_tree(layout.modules())?;
    let stamped = scan
        .sources
        .into_iter()
        .filter_map(|source| layout.artifact_for(&source).map(|artifact| (source, artifact)))
        .map(|(source, artifact)| Ok((modified(&artifact)?, Job { source, artifact })))
        .collect::<Result<Vec<_>, BuildError>>()?;

    let jobs: Vec<Job> = stamped
        .into_iter()
        .filter(|(stamp, _)| is_stale(*stamp, scan.latest))
        .map(|(_, job)| job)
        .collect();
    tracing::debug!(stale = jobs.len(), root = %layout.modules().display(), "planned build");
    Ok(BuildPlan {
        jobs,
        latest: scan.latest,
    })
}
