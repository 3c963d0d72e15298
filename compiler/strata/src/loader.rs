//! Locating and decoding definitions.

use std::path::Path;
use std::sync::Arc;

use strata_build::{ArtifactLayout, Pipeline};
use strata_ir::{decode_artifact, Definition, DefinitionKind};

use crate::errors::LoadError;

/// Produces decoded definitions by name.
///
/// Every call may do I/O; callers are expected to cache.
pub trait ArtifactLoader: Send + Sync {
    /// `Ok(None)` when nothing defines `name`.
    fn load(&self, kind: DefinitionKind, name: &str) -> Result<Option<Arc<Definition>>, LoadError>;
}

/// Loads artifacts from the cache directory, refreshing stale ones through
/// the pipeline first when one is configured.
pub struct FsArtifactLoader {
    layout: ArtifactLayout,
    pipeline: Option<Arc<Pipeline>>,
}

impl FsArtifactLoader {
    pub fn new(layout: ArtifactLayout) -> Self {
        FsArtifactLoader {
            layout,
            pipeline: None,
        }
    }

    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Arc<Pipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

impl ArtifactLoader for FsArtifactLoader {
    fn load(&self, kind: DefinitionKind, name: &str) -> Result<Option<Arc<Definition>>, LoadError> {
        let source = match kind {
            DefinitionKind::Class | DefinitionKind::DefinedType => self.layout.class_source(name),
            DefinitionKind::Function => self.layout.function_source(name),
        };
        let Some(source) = source else {
            return Ok(None);
        };
        let Some(artifact) = self.layout.artifact_for(&source) else {
            return Ok(None);
        };

        if let Some(pipeline) = &self.pipeline {
            if source.exists() {
                pipeline.ensure_fresh(&source)?;
            }
        }

        let Some(text) = read_optional(&artifact)? else {
            tracing::debug!(%kind, name, artifact = %artifact.display(), "no artifact");
            return Ok(None);
        };
        let decoded = decode_artifact(&text).map_err(|source| LoadError::Parse {
            path: artifact.clone(),
            source,
        })?;
        tracing::debug!(%kind, name, artifact = %artifact.display(), "loaded artifact");
        Ok(decoded.find(kind, name))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, LoadError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LoadError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
