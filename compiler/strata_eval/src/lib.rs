//! Strata Eval - resolution of decoded expression trees.
//!
//! # Architecture
//!
//! - [`resolve`]: memoized, cycle-guarded evaluation of one node against an
//!   [`Env`] (a [`Resolver`] plus the current [`Scope`])
//! - [`eval_statements`]: the statement-sequence evaluator that stops on
//!   `return` at class and function boundaries
//! - [`ClassInstance`]: the resolved form of a class or defined-type title
//! - [`invoke_function`]: user function calls with fresh per-call bodies
//! - [`evaluate_binary`] / [`evaluate_unary`]: direct operator dispatch
//!
//! The [`Resolver`] is the only way out of a tree: cross-class references,
//! function lookup and hierarchy overrides all go through it.

mod builtins;
mod eval;
mod function;
mod instance;
mod operators;
mod resolver;
mod scope;
mod stack;
mod unary_operators;

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test helpers panic on broken fixtures")]
pub(crate) mod test_helpers;

use strata_ir::{EvalError, Value};

pub use builtins::BUILTINS;
pub use eval::{eval_statements, resolve, settle, Env};
pub use function::invoke_function;
pub use instance::{is_encrypted, ClassInstance, DeclaredResource, Hint, ResolvedProperty, Seed};
pub use operators::{evaluate_binary, values_equal};
pub use resolver::{GlobalLookup, HieraSourceKind, Resolver};
pub use scope::{LocalFrame, Scope};
pub use stack::ensure_sufficient_stack;
pub use unary_operators::evaluate_unary;

/// Result of an operation that cannot raise `return`.
pub type EvalResult = Result<Value, EvalError>;
