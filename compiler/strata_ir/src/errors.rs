//! Error taxonomy for decoding and resolution.
//!
//! - [`ParseError`]: the compiled artifact is malformed
//! - [`EvalError`]: a node failed to resolve
//! - [`ResolveError`]: raised by the `fail` built-in, carries the node
//! - [`CompilationError`]: a class, defined type or function failed as a whole
//!
//! [`Interrupt`] is the evaluator's result channel. It separates the `return`
//! control transfer from genuine errors so that nothing handling errors can
//! swallow a return by accident.

use std::fmt;

use thiserror::Error;

use crate::definition::DefinitionKind;
use crate::expr::ExprId;
use crate::value::Value;

/// Outcome of resolving a node.
pub type Outcome = Result<Value, Interrupt>;

/// Non-value exits from node resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Interrupt {
    /// Non-local control transfer raised by `return`. Only the
    /// statement-sequence evaluator at a function or class boundary stops it.
    Return(Value),
    /// A genuine failure.
    Error(EvalError),
}

impl From<EvalError> for Interrupt {
    fn from(err: EvalError) -> Self {
        Interrupt::Error(err)
    }
}

impl From<ResolveError> for Interrupt {
    fn from(err: ResolveError) -> Self {
        Interrupt::Error(EvalError::Fail(err))
    }
}

/// Identifies the expression node an error originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub id: ExprId,
    pub kind: &'static str,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node #{}", self.kind, self.id.raw())
    }
}

/// Malformed compiled artifact.
///
/// Fatal to the one definition being loaded; never cached, so the next
/// request re-reads the artifact.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("artifact is not valid JSON: {0}")]
    Json(String),

    #[error("malformed '{tag}' node: {message}")]
    Malformed { tag: String, message: String },

    #[error("expected {expected}, found {found}")]
    Shape { expected: &'static str, found: String },

    #[error("{kind} definition has no name")]
    MissingName { kind: DefinitionKind },
}

impl ParseError {
    pub fn malformed(tag: &str, message: impl Into<String>) -> Self {
        ParseError::Malformed {
            tag: tag.to_string(),
            message: message.into(),
        }
    }
}

/// Error raised by the `fail` built-in.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message} (at {node})")]
pub struct ResolveError {
    pub message: String,
    pub node: NodeRef,
}

/// Failure while resolving a node.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("evaluation failed: {0}")]
    Fail(#[from] ResolveError),

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("unsupported expression '{tag}'")]
    Unsupported { tag: String },

    #[error("operator '{op}' is not defined for {left} and {right}")]
    OperandMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot apply '{op}' to {operand}")]
    InvalidOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{op}'")]
    Overflow { op: &'static str },

    #[error("no selector entry matched '{value}'")]
    NoSelectorMatch { value: String },

    #[error("cannot assign to a non-variable expression")]
    InvalidAssignmentTarget,

    #[error("cannot index {target} with {key}")]
    InvalidAccess {
        target: &'static str,
        key: &'static str,
    },

    #[error("'{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("function '{name}' returned {actual}, expected {expected}")]
    ReturnType {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("lookup of '{key}' found no value and no default was given")]
    LookupMissing { key: String },

    #[error("cyclic reference to {kind} '{name}'")]
    Cycle { kind: DefinitionKind, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: DefinitionKind, name: String },

    #[error("failed to load {kind} '{name}': {message}")]
    Load {
        kind: DefinitionKind,
        name: String,
        message: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compilation(Box<CompilationError>),
}

impl From<CompilationError> for EvalError {
    fn from(err: CompilationError) -> Self {
        EvalError::Compilation(Box::new(err))
    }
}

/// A class, defined type or function failed to resolve.
///
/// Surfaced to the caller of the failing definition only; sibling
/// resolutions are unaffected.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{kind} '{name}' failed to compile: {cause}")]
pub struct CompilationError {
    pub kind: DefinitionKind,
    pub name: String,
    pub cause: Box<EvalError>,
}

impl CompilationError {
    pub fn new(kind: DefinitionKind, name: impl Into<String>, cause: EvalError) -> Self {
        CompilationError {
            kind,
            name: name.into(),
            cause: Box::new(cause),
        }
    }

    /// The innermost cause, skipping nested compilation wrappers.
    pub fn root_cause(&self) -> &EvalError {
        let mut cause = self.cause.as_ref();
        while let EvalError::Compilation(inner) = cause {
            cause = inner.cause.as_ref();
        }
        cause
    }
}
