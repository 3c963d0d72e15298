//! Strata IR - the expression model shared by every stage of the engine.
//!
//! This crate owns the data that flows between the artifact decoder and the
//! evaluator:
//!
//! - [`Value`] / [`TypeRef`]: runtime values and type descriptors
//! - [`Expr`] / [`ExprKind`]: the closed expression/statement sum type, each
//!   node carrying its own [`ResolveCell`] memo
//! - [`Definition`]: classes, defined types and functions as decoded
//! - [`decode_artifact`]: compiled-artifact JSON to tree
//! - [`errors`]: the error taxonomy used across resolution
//!
//! # Compiled artifact format
//!
//! ```text
//! {"^": [tag, arg...]}      call-like node
//! {"#": [k1, v1, k2, v2]}   flat map
//! [a, b, c]                 list
//! anything else             literal
//! ```

mod decode;
mod definition;
pub mod errors;
mod expr;
mod value;

pub use decode::{decode_artifact, decode_expr, Artifact};
pub use definition::{Definition, DefinitionKind, Param};
pub use errors::{
    CompilationError, EvalError, Interrupt, NodeRef, Outcome, ParseError, ResolveError,
};
pub use expr::{
    AttributeOp, BinaryOp, CaseOption, CellState, Expr, ExprId, ExprKind, ResolveCell,
    ResourceBody, ResourceDecl, UnaryOp,
};
pub use value::{TypeRef, Value};
