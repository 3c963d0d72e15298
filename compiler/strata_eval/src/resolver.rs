//! The capability classes, functions and built-ins call back into.

use std::fmt;
use std::sync::Arc;

use strata_ir::{Definition, EvalError, Value};

use crate::instance::ClassInstance;

/// Result of probing a global variable without fetching it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalLookup {
    Missing,
    /// Defined, but not by a hierarchy level (a fact, for instance).
    ExistsUnknownLevel,
    /// Defined by the hierarchy level at this index (0 = highest priority).
    Level(usize),
}

impl GlobalLookup {
    #[inline]
    pub fn exists(self) -> bool {
        !matches!(self, GlobalLookup::Missing)
    }

    #[inline]
    pub fn level(self) -> Option<usize> {
        match self {
            GlobalLookup::Level(level) => Some(level),
            _ => None,
        }
    }
}

/// What a hierarchy level contributed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HieraSourceKind {
    /// A class included through the class-list key.
    Class,
    /// A `class::param` override.
    Property,
}

impl fmt::Display for HieraSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HieraSourceKind::Class => write!(f, "class"),
            HieraSourceKind::Property => write!(f, "property"),
        }
    }
}

/// Cross-class resolution and override lookup.
///
/// Implementations must return the same cached [`Arc`] for repeated
/// `resolve_class`/`resolve_function` calls with the same name, without
/// repeating any I/O.
pub trait Resolver: Send + Sync {
    fn resolve_class(&self, name: &str) -> Result<Arc<ClassInstance>, EvalError>;

    /// `Ok(None)` when no such function exists.
    fn resolve_function(&self, name: &str) -> Result<Option<Arc<Definition>>, EvalError>;

    fn get_global_variable(&self, name: &str) -> Option<Value>;

    fn has_global_variable(&self, name: &str) -> GlobalLookup;

    fn register_hiera_source(&self, kind: HieraSourceKind, key: &str, level: usize);
}
