//! In-memory resolver and evaluation shortcuts for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use strata_ir::{
    decode_artifact, decode_expr, CompilationError, Definition, DefinitionKind, EvalError,
    Outcome, Value,
};

use crate::eval::{resolve, Env};
use crate::instance::ClassInstance;
use crate::resolver::{GlobalLookup, HieraSourceKind, Resolver};
use crate::scope::LocalFrame;

/// Resolver over decoded definitions and a fixed global map.
#[derive(Default)]
pub(crate) struct MapResolver {
    definitions: FxHashMap<(DefinitionKind, String), Arc<Definition>>,
    globals: FxHashMap<String, (Value, GlobalLookup)>,
    classes: Mutex<FxHashMap<String, Arc<ClassInstance>>>,
    pub loads: AtomicUsize,
    pub sources: Mutex<Vec<(HieraSourceKind, String, usize)>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every definition of a compiled artifact.
    pub fn with_artifact(mut self, artifact: &serde_json::Value) -> Self {
        let artifact = decode_artifact(&artifact.to_string()).unwrap();
        for def in artifact.definitions() {
            self.definitions
                .insert((def.kind, def.name.clone()), Arc::clone(def));
        }
        self
    }

    pub fn with_global(mut self, name: &str, value: Value, level: Option<usize>) -> Self {
        let lookup = level.map_or(GlobalLookup::ExistsUnknownLevel, GlobalLookup::Level);
        self.globals.insert(name.to_string(), (value, lookup));
        self
    }

    pub fn definition(&self, kind: DefinitionKind, name: &str) -> Arc<Definition> {
        Arc::clone(&self.definitions[&(kind, name.to_string())])
    }
}

impl Resolver for MapResolver {
    fn resolve_class(&self, name: &str) -> Result<Arc<ClassInstance>, EvalError> {
        if let Some(instance) = self.classes.lock().get(name) {
            return Ok(Arc::clone(instance));
        }
        let Some(def) = self.definitions.get(&(DefinitionKind::Class, name.to_string())) else {
            return Err(EvalError::NotFound {
                kind: DefinitionKind::Class,
                name: name.to_string(),
            });
        };
        self.loads.fetch_add(1, Ordering::SeqCst);
        let instance = Arc::new(ClassInstance::class(Arc::clone(def)));
        self.classes
            .lock()
            .insert(name.to_string(), Arc::clone(&instance));
        match instance.resolve(self) {
            Ok(()) => Ok(instance),
            Err(e) => {
                self.classes.lock().remove(name);
                Err(CompilationError::new(DefinitionKind::Class, name, e).into())
            }
        }
    }

    fn resolve_function(&self, name: &str) -> Result<Option<Arc<Definition>>, EvalError> {
        Ok(self
            .definitions
            .get(&(DefinitionKind::Function, name.to_string()))
            .cloned())
    }

    fn get_global_variable(&self, name: &str) -> Option<Value> {
        self.globals.get(name).map(|(value, _)| value.clone())
    }

    fn has_global_variable(&self, name: &str) -> GlobalLookup {
        self.globals
            .get(name)
            .map_or(GlobalLookup::Missing, |(_, lookup)| *lookup)
    }

    fn register_hiera_source(&self, kind: HieraSourceKind, key: &str, level: usize) {
        self.sources.lock().push((kind, key.to_string(), level));
    }
}

/// Decode and resolve one expression in a fresh function frame.
pub(crate) fn eval_json(json: &serde_json::Value, resolver: &MapResolver) -> Outcome {
    let expr = decode_expr(json).unwrap();
    let frame = LocalFrame::new();
    resolve(&expr, &Env::new(resolver, &frame))
}

/// `{"^": [tag, args...]}`.
pub(crate) fn node(tag: &str, args: Vec<serde_json::Value>) -> serde_json::Value {
    let mut parts = vec![serde_json::Value::from(tag)];
    parts.extend(args);
    serde_json::json!({ "^": parts })
}

/// `{"#": [k1, v1, ...]}`.
pub(crate) fn pn_map(entries: Vec<(&str, serde_json::Value)>) -> serde_json::Value {
    let flat: Vec<serde_json::Value> = entries
        .into_iter()
        .flat_map(|(k, v)| [serde_json::Value::from(k), v])
        .collect();
    serde_json::json!({ "#": flat })
}

pub(crate) fn var(name: &str) -> serde_json::Value {
    node("$", vec![name.into()])
}

pub(crate) fn assign(name: &str, value: serde_json::Value) -> serde_json::Value {
    node("=", vec![var(name), value])
}

pub(crate) fn call(name: &str, args: Vec<serde_json::Value>) -> serde_json::Value {
    node(
        "call",
        vec![pn_map(vec![
            ("functor", node("qn", vec![name.into()])),
            ("args", serde_json::Value::Array(args)),
        ])],
    )
}

/// A parameter spec: optional type name and optional default.
pub(crate) fn param(type_name: Option<&str>, default: Option<serde_json::Value>) -> serde_json::Value {
    let mut entries = Vec::new();
    if let Some(t) = type_name {
        entries.push(("type", node("qr", vec![t.into()])));
    }
    if let Some(d) = default {
        entries.push(("value", d));
    }
    pn_map(entries)
}

/// A `class`, `define` or `function` definition node.
pub(crate) fn definition(
    tag: &str,
    name: &str,
    parent: Option<&str>,
    params: Vec<(&str, serde_json::Value)>,
    body: Vec<serde_json::Value>,
) -> serde_json::Value {
    let mut entries = vec![("name", serde_json::Value::from(name))];
    if let Some(parent) = parent {
        entries.push(("parent", parent.into()));
    }
    entries.push(("params", pn_map(params)));
    entries.push(("body", serde_json::Value::Array(body)));
    node(tag, vec![pn_map(entries)])
}
