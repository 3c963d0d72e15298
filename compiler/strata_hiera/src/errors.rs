//! Hierarchy errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HieraError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML in {}: {message}", path.display())]
    Yaml { path: PathBuf, message: String },

    #[error("invalid hierarchy document: {0}")]
    Document(String),

    #[error("hierarchy level {level} does not exist ({len} levels)")]
    LevelOutOfRange { level: usize, len: usize },

    #[error("encryption failed: {0}")]
    Encryption(String),
}

impl HieraError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HieraError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn yaml(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        HieraError::Yaml {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
