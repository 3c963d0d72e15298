//! Pipeline errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to scan {}: {message}", root.display())]
    Walk { root: PathBuf, message: String },

    #[error("{} is not under the module tree", path.display())]
    OutsideModules { path: PathBuf },

    #[error("compiler '{program}' failed: {message}")]
    Compiler { program: String, message: String },

    #[error("failed to start worker pool: {0}")]
    Pool(String),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A batch that did not produce all of its artifacts.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("batch {batch} failed: {message}")]
pub struct CompileError {
    pub batch: usize,
    pub message: String,
}
