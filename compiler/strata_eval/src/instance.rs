//! Resolved classes and defined-type instances.
//!
//! A [`ClassInstance`] is created from a shared [`Definition`] with a fresh
//! copy of its parameters and body, so every instance memoizes its own
//! expressions. Resolution runs in three phases:
//!
//! 1. the parent class (`inherits`) is resolved through the [`Resolver`]
//! 2. parameters, in declaration order: declared type, then override, then
//!    default expression
//! 3. body statements, in source order; assignments become properties
//!
//! Failures of single properties are captured on the property. Only a
//! failing parent or a failing non-assignment statement fails the instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use strata_ir::{
    Definition, DefinitionKind, EvalError, Expr, Interrupt, Outcome, Param, TypeRef, Value,
};

use crate::eval::{eval_statements, resolve, Env};
use crate::resolver::{GlobalLookup, HieraSourceKind, Resolver};
use crate::scope::Scope;

/// UI hint attached to a resolved property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hint {
    /// A parameter with neither an override nor a default.
    MissingValue,
    TypeMismatch { expected: String, actual: String },
    /// The value is an encrypted envelope and is shown verbatim.
    Encrypted,
}

/// A property as resolved for one instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedProperty {
    pub type_: Option<TypeRef>,
    pub value: Option<Value>,
    /// The declared default, evaluated even when an override supplied the
    /// value.
    pub default: Option<Value>,
    pub error: Option<EvalError>,
    pub hints: Vec<Hint>,
}

impl ResolvedProperty {
    pub fn with_value(value: Value) -> Self {
        ResolvedProperty {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn failed(error: EvalError) -> Self {
        ResolvedProperty {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Attach type and encryption hints for the current value.
    fn check(&mut self) {
        if let Some(value) = &self.value {
            if let Some(expected) = &self.type_ {
                if !expected.accepts(value) {
                    self.hints.push(Hint::TypeMismatch {
                        expected: expected.to_string(),
                        actual: value.type_name().to_string(),
                    });
                }
            }
            if value.as_str().is_some_and(is_encrypted) {
                self.hints.push(Hint::Encrypted);
            }
        }
    }
}

/// Whether a string is an encrypted-value envelope (`ENC[...]`).
pub fn is_encrypted(s: &str) -> bool {
    s.starts_with("ENC[") && s.ends_with(']')
}

/// A resource declared inside a class body.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredResource {
    pub type_name: String,
    pub title: String,
    pub attributes: IndexMap<String, Value>,
}

/// A parameter override supplied by the caller instead of the hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct Seed {
    pub value: Value,
    /// Hierarchy level that produced the value, if any.
    pub level: Option<usize>,
}

/// The resolved form of a class, or of one defined-type title.
pub struct ClassInstance {
    name: String,
    title: Option<String>,
    definition: Arc<Definition>,
    params: Vec<Param>,
    body: Vec<Expr>,
    /// Defined-type overrides; classes consult the hierarchy instead.
    seeds: Option<IndexMap<String, Seed>>,
    properties: RwLock<IndexMap<String, ResolvedProperty>>,
    overrides: RwLock<IndexMap<String, usize>>,
    resources: Mutex<Vec<DeclaredResource>>,
    public: AtomicBool,
}

impl ClassInstance {
    /// A class instance. Parameters are overridden through `class::param`
    /// hierarchy keys.
    pub fn class(definition: Arc<Definition>) -> Self {
        Self::build(definition, None, None)
    }

    /// One defined-type title, overridden by `seeds`.
    pub fn defined_type(
        definition: Arc<Definition>,
        title: impl Into<String>,
        seeds: IndexMap<String, Seed>,
    ) -> Self {
        Self::build(definition, Some(title.into()), Some(seeds))
    }

    fn build(
        definition: Arc<Definition>,
        title: Option<String>,
        seeds: Option<IndexMap<String, Seed>>,
    ) -> Self {
        ClassInstance {
            name: definition.name.clone(),
            title,
            params: definition.params.clone(),
            body: definition.body.clone(),
            definition,
            seeds,
            properties: RwLock::new(IndexMap::new()),
            overrides: RwLock::new(IndexMap::new()),
            resources: Mutex::new(Vec::new()),
            public: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn kind(&self) -> DefinitionKind {
        self.definition.kind
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    pub fn parent(&self) -> Option<&str> {
        self.definition.parent.as_deref()
    }

    pub fn property(&self, name: &str) -> Option<ResolvedProperty> {
        self.properties.read().get(name).cloned()
    }

    /// Resolved value of a property, if it has one.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).and_then(|p| p.value.clone())
    }

    /// Snapshot of every property in resolution order.
    pub fn properties(&self) -> IndexMap<String, ResolvedProperty> {
        self.properties.read().clone()
    }

    /// Hierarchy level that overrode `name`.
    pub fn override_level(&self, name: &str) -> Option<usize> {
        self.overrides.read().get(name).copied()
    }

    pub fn overrides(&self) -> IndexMap<String, usize> {
        self.overrides.read().clone()
    }

    pub fn resources(&self) -> Vec<DeclaredResource> {
        self.resources.lock().clone()
    }

    pub fn is_public(&self) -> bool {
        self.public.load(Ordering::Acquire)
    }

    /// Mark the instance as referenced from outside the engine.
    pub fn mark_public(&self) {
        self.public.store(true, Ordering::Release);
    }

    /// Run all three resolution phases.
    pub fn resolve(&self, resolver: &dyn Resolver) -> Result<(), EvalError> {
        if let Some(parent) = self.parent() {
            resolver.resolve_class(parent)?;
        }

        let scope = ClassScope { instance: self };
        let env = Env::new(resolver, &scope);

        for param in &self.params {
            let property = self.resolve_param(param, &env);
            self.properties.write().insert(param.name.clone(), property);
        }

        eval_statements(&self.body, &env)?;
        tracing::debug!(
            class = %self.name,
            title = self.title.as_deref().unwrap_or_default(),
            properties = self.properties.read().len(),
            "resolved"
        );
        Ok(())
    }

    fn resolve_param(&self, param: &Param, env: &Env<'_>) -> ResolvedProperty {
        let mut property = ResolvedProperty::default();

        if let Some(type_expr) = &param.type_expr {
            match resolve(type_expr, env) {
                Ok(Value::Type(t)) => property.type_ = Some(t),
                Ok(_) => {}
                Err(Interrupt::Error(e)) => property.error = Some(e),
                Err(Interrupt::Return(_)) => {}
            }
        }

        let default = param.default.as_ref().map(|default| match resolve(default, env) {
            Ok(v) | Err(Interrupt::Return(v)) => Ok(v),
            Err(Interrupt::Error(e)) => Err(e),
        });
        property.default = default.as_ref().and_then(|d| d.as_ref().ok().cloned());

        if let Some(seed) = self.param_override(&param.name, env.resolver) {
            if let Some(level) = seed.level {
                self.overrides.write().insert(param.name.clone(), level);
            }
            property.value = Some(seed.value);
        } else {
            // A failing default only matters when nothing overrides it.
            match default {
                Some(Ok(v)) => property.value = Some(v),
                Some(Err(e)) => property.error = Some(e),
                None => property.hints.push(Hint::MissingValue),
            }
        }

        property.check();
        property
    }

    fn param_override(&self, param: &str, resolver: &dyn Resolver) -> Option<Seed> {
        if let Some(seeds) = &self.seeds {
            return seeds.get(param).cloned();
        }
        let key = format!("{}::{param}", self.name);
        match resolver.has_global_variable(&key) {
            GlobalLookup::Missing => None,
            found => {
                let value = resolver.get_global_variable(&key)?;
                if let Some(level) = found.level() {
                    resolver.register_hiera_source(HieraSourceKind::Property, &key, level);
                }
                Some(Seed {
                    value,
                    level: found.level(),
                })
            }
        }
    }
}

impl std::fmt::Debug for ClassInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassInstance")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("properties", &self.properties.read().len())
            .finish_non_exhaustive()
    }
}

/// Scope of a class body: variables are the instance's properties.
struct ClassScope<'a> {
    instance: &'a ClassInstance,
}

impl Scope for ClassScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.instance.value(name) {
            return Some(value);
        }
        match (name, self.instance.title()) {
            ("title" | "name", Some(title)) => Some(Value::string(title)),
            _ => None,
        }
    }

    fn assign(&self, name: &str, outcome: Outcome) -> Outcome {
        let mut property = match outcome {
            Ok(value) => ResolvedProperty::with_value(value),
            Err(Interrupt::Error(e)) => {
                tracing::debug!(class = %self.instance.name, property = name, error = %e, "property failed");
                ResolvedProperty::failed(e)
            }
            Err(ret @ Interrupt::Return(_)) => return Err(ret),
        };
        property.check();
        let value = property.value.clone().unwrap_or(Value::Undef);
        self.instance
            .properties
            .write()
            .insert(name.to_string(), property);
        Ok(value)
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.instance.name)
    }

    fn parent_class(&self) -> Option<&str> {
        self.instance.parent()
    }

    fn declare_resource(&self, resource: DeclaredResource) {
        self.instance.resources.lock().push(resource);
    }
}
