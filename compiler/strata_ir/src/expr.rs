//! Expression/statement tree.
//!
//! # Identity and memoization
//!
//! Every [`Expr`] carries an [`ExprId`] assigned by the decoder and a
//! [`ResolveCell`] holding its resolution state. The evaluator consults the
//! cell before doing any work:
//!
//! ```text
//! Unresolved ──begin──► Resolving ──finish──► Resolved(v) | Returned(v) | Failed(e)
//!                           │
//!                           └─ begin again (re-entrant) ──► Ok(Undef), no recursion
//! ```
//!
//! Cloning an `Expr` keeps the identity but produces unresolved cells, so one
//! decoded body can back any number of independent instances.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::definition::Definition;
use crate::errors::{EvalError, Interrupt, NodeRef, Outcome};
use crate::value::Value;

/// Stable identity of a decoded node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        ExprId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Resolution state of one node.
#[derive(Clone, Debug, PartialEq)]
pub enum CellState {
    Unresolved,
    Resolving,
    Resolved(Value),
    /// Evaluation raised the `return` control transfer with this value.
    Returned(Value),
    Failed(EvalError),
}

/// Interior-mutable memo cell owned by each node.
///
/// The lock is held only while reading or writing the state, never while the
/// node is being evaluated.
pub struct ResolveCell {
    state: Mutex<CellState>,
}

impl ResolveCell {
    pub fn new() -> Self {
        ResolveCell {
            state: Mutex::new(CellState::Unresolved),
        }
    }

    /// Start resolving.
    ///
    /// Returns `None` when the caller should evaluate (the cell is now
    /// `Resolving`), or the cached outcome otherwise. A cell that is already
    /// `Resolving` answers `Ok(Undef)`: the node is part of a cycle and the
    /// best current value is absent.
    pub fn begin(&self) -> Option<Outcome> {
        let mut state = self.state.lock();
        match &*state {
            CellState::Unresolved => {
                *state = CellState::Resolving;
                None
            }
            CellState::Resolving => {
                tracing::trace!("re-entrant resolution, returning undef");
                Some(Ok(Value::Undef))
            }
            CellState::Resolved(v) => Some(Ok(v.clone())),
            CellState::Returned(v) => Some(Err(Interrupt::Return(v.clone()))),
            CellState::Failed(e) => Some(Err(Interrupt::Error(e.clone()))),
        }
    }

    /// Record the outcome of an evaluation started with [`begin`](Self::begin).
    pub fn finish(&self, outcome: &Outcome) {
        *self.state.lock() = match outcome {
            Ok(v) => CellState::Resolved(v.clone()),
            Err(Interrupt::Return(v)) => CellState::Returned(v.clone()),
            Err(Interrupt::Error(e)) => CellState::Failed(e.clone()),
        };
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CellState {
        self.state.lock().clone()
    }
}

impl Default for ResolveCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResolveCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let name = match &*state {
            CellState::Unresolved => "Unresolved",
            CellState::Resolving => "Resolving",
            CellState::Resolved(_) => "Resolved",
            CellState::Returned(_) => "Returned",
            CellState::Failed(_) => "Failed",
        };
        write!(f, "ResolveCell({name})")
    }
}

/// A node in the expression/statement tree.
pub struct Expr {
    id: ExprId,
    pub kind: ExprKind,
    cell: ResolveCell,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Expr {
            id,
            kind,
            cell: ResolveCell::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ExprId {
        self.id
    }

    #[inline]
    pub fn cell(&self) -> &ResolveCell {
        &self.cell
    }

    /// Reference used by diagnostics.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            id: self.id,
            kind: self.kind.name(),
        }
    }
}

/// Produces a fresh tree: same identities and shapes, unresolved cells.
impl Clone for Expr {
    fn clone(&self) -> Self {
        Expr {
            id: self.id,
            kind: self.kind.clone(),
            cell: ResolveCell::new(),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?}", self.id.0, self.kind)
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    In,
}

impl BinaryOp {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::LtEq,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::GtEq,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "in" => BinaryOp::In,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

/// One `when ... then ...` arm of a `case`.
#[derive(Clone, Debug)]
pub struct CaseOption {
    pub values: Vec<Expr>,
    pub body: Vec<Expr>,
}

/// `name => value` inside a resource body.
#[derive(Clone, Debug)]
pub struct AttributeOp {
    pub name: String,
    pub value: Expr,
}

/// `title: attr => value, ...` inside a resource declaration.
#[derive(Clone, Debug)]
pub struct ResourceBody {
    pub title: Expr,
    pub operations: Vec<AttributeOp>,
}

/// `type { title: ... }`.
#[derive(Clone, Debug)]
pub struct ResourceDecl {
    pub type_name: Box<Expr>,
    pub bodies: Vec<ResourceBody>,
}

/// Node variants. Closed: unknown artifact tags become [`ExprKind::Unsupported`].
#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Value),
    List(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    TypeReference(String),
    QualifiedName(String),
    Block(Vec<Expr>),
    Class(Arc<Definition>),
    DefinedType(Arc<Definition>),
    Function(Arc<Definition>),
    Variable(String),
    Assignment {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Access {
        target: Box<Expr>,
        keys: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    If {
        test: Box<Expr>,
        then_branch: Vec<Expr>,
        else_branch: Vec<Expr>,
        /// `unless`: the branches are taken on a falsy test.
        negated: bool,
    },
    Case {
        test: Box<Expr>,
        options: Vec<CaseOption>,
    },
    Selector {
        test: Box<Expr>,
        entries: Vec<(Expr, Expr)>,
    },
    Concat(Vec<Expr>),
    Str(Box<Expr>),
    Heredoc(Box<Expr>),
    Resource(ResourceDecl),
    Return(Option<Box<Expr>>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Paren(Box<Expr>),
    Default,
    Nop,
    Regex(String),
    /// Unknown artifact tag; fails only when resolved.
    Unsupported {
        tag: String,
        args: Vec<serde_json::Value>,
    },
}

impl ExprKind {
    /// Short variant name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::List(_) => "list",
            ExprKind::Hash(_) => "hash",
            ExprKind::TypeReference(_) => "type reference",
            ExprKind::QualifiedName(_) => "qualified name",
            ExprKind::Block(_) => "block",
            ExprKind::Class(_) => "class",
            ExprKind::DefinedType(_) => "define",
            ExprKind::Function(_) => "function",
            ExprKind::Variable(_) => "variable",
            ExprKind::Assignment { .. } => "assignment",
            ExprKind::Access { .. } => "access",
            ExprKind::Call { .. } => "call",
            ExprKind::If { .. } => "if",
            ExprKind::Case { .. } => "case",
            ExprKind::Selector { .. } => "selector",
            ExprKind::Concat(_) => "concat",
            ExprKind::Str(_) => "str",
            ExprKind::Heredoc(_) => "heredoc",
            ExprKind::Resource(_) => "resource",
            ExprKind::Return(_) => "return",
            ExprKind::Binary { .. } => "binary",
            ExprKind::Unary { .. } => "unary",
            ExprKind::Paren(_) => "paren",
            ExprKind::Default => "default",
            ExprKind::Nop => "nop",
            ExprKind::Regex(_) => "regexp",
            ExprKind::Unsupported { .. } => "unsupported",
        }
    }
}
