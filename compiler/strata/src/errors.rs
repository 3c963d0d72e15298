//! Errors at the engine boundary.

use std::io;
use std::path::PathBuf;

use strata_build::BuildError;
use strata_hiera::HieraError;
use strata_ir::{DefinitionKind, EvalError, ParseError};
use thiserror::Error;

/// A definition's artifact could not be produced or read.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to refresh artifact: {0}")]
    Build(#[from] BuildError),

    #[error("malformed artifact {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

impl LoadError {
    /// Evaluation-level form, keeping parse errors distinct.
    pub fn into_eval(self, kind: DefinitionKind, name: &str) -> EvalError {
        match self {
            LoadError::Parse { source, .. } => EvalError::Parse(source),
            other => EvalError::Load {
                kind,
                name: name.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// A setup or I/O failure at the environment/workspace boundary.
///
/// Often collected as a warning instead of being returned.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{title}: {message}")]
pub struct WorkspaceError {
    pub title: String,
    pub message: String,
}

impl WorkspaceError {
    pub fn new(title: impl Into<String>, message: impl ToString) -> Self {
        WorkspaceError {
            title: title.into(),
            message: message.to_string(),
        }
    }
}

/// Any failure surfaced by a node context or environment.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Hiera(#[from] HieraError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("'{value}' at level {level} is not a list of class names")]
    ClassList { level: usize, value: String },
}
