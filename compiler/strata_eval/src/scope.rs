//! Variable scopes.
//!
//! A scope decides what an assignment does with its outcome: class scopes
//! record the value (or the failure) as a resolved property and carry on,
//! function frames bind the value and propagate failures.

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use strata_ir::{Outcome, Value};

use crate::instance::DeclaredResource;

pub trait Scope {
    /// A variable bound in this scope.
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Bind `name` to the outcome of its right-hand side.
    fn assign(&self, name: &str, outcome: Outcome) -> Outcome;

    /// Name of the class whose body this scope evaluates.
    fn owner(&self) -> Option<&str> {
        None
    }

    /// Class this scope inherits unqualified variables from.
    fn parent_class(&self) -> Option<&str> {
        None
    }

    fn declare_resource(&self, resource: DeclaredResource);
}

/// Function-invocation frame.
#[derive(Default)]
pub struct LocalFrame {
    vars: RefCell<FxHashMap<String, Value>>,
}

impl LocalFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }
}

impl Scope for LocalFrame {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    fn assign(&self, name: &str, outcome: Outcome) -> Outcome {
        let value = outcome?;
        self.bind(name, value.clone());
        Ok(value)
    }

    fn declare_resource(&self, resource: DeclaredResource) {
        tracing::debug!(
            type_name = %resource.type_name,
            title = %resource.title,
            "resource declared outside a class body, ignored"
        );
    }
}
