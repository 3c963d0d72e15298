//! Class, defined-type and function definitions as decoded from an artifact.

use std::fmt;

use crate::expr::Expr;

/// Which kind of definition a name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionKind {
    Class,
    DefinedType,
    Function,
}

impl DefinitionKind {
    /// Artifact tag that introduces this kind of definition.
    pub fn tag(self) -> &'static str {
        match self {
            DefinitionKind::Class => "class",
            DefinitionKind::DefinedType => "define",
            DefinitionKind::Function => "function",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Class => write!(f, "class"),
            DefinitionKind::DefinedType => write!(f, "defined type"),
            DefinitionKind::Function => write!(f, "function"),
        }
    }
}

/// A declared parameter.
#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub type_expr: Option<Expr>,
    pub default: Option<Expr>,
    /// Captures remaining arguments (`*$rest`).
    pub splat: bool,
}

/// A decoded definition. The static part shared by every resolved instance.
///
/// Instances never evaluate `params`/`body` in place: they clone them, which
/// yields fresh memo cells (see [`Expr`]'s `Clone`).
#[derive(Clone, Debug)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    pub params: Vec<Param>,
    /// Inherited class (`class a inherits b`).
    pub parent: Option<String>,
    pub body: Vec<Expr>,
    /// Declared return type (functions only).
    pub returns: Option<Expr>,
}

impl Definition {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}
