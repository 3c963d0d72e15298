//! Per-node resolution context.
//!
//! A [`NodeContext`] owns everything resolution needs for one node: its facts,
//! the hierarchy compiled against them, and single-flight caches of resolved
//! classes, defined-type titles and function definitions. It is also the
//! [`Resolver`] those classes and functions call back into.
//!
//! # Hierarchy keys
//!
//! ```yaml
//! ntp::servers: [a, b]          # class parameter override
//! classes: [ntp, base]          # class list (key configurable)
//! resources:                    # defined-type title overrides
//!   web::vhost:
//!     shop: { port: 8080 }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use strata_eval::{ClassInstance, GlobalLookup, HieraSourceKind, Resolver, Seed};
use strata_hiera::{CompiledHierarchy, HieraError, Hierarchy};
use strata_ir::{CompilationError, Definition, DefinitionKind, EvalError, Value};

use crate::cache::{Pending, SingleFlight};
use crate::dump::ClassDump;
use crate::errors::EngineError;
use crate::facts::{Facts, IdentityFacts};
use crate::loader::ArtifactLoader;

/// Hierarchy key holding defined-type title overrides.
pub const RESOURCES_KEY: &str = "resources";
/// Default hierarchy key holding the class list.
pub const DEFAULT_CLASS_LIST_KEY: &str = "classes";

type InstanceCache<K> = SingleFlight<K, Arc<ClassInstance>, EvalError>;

/// Resolution state for one node.
pub struct NodeContext {
    identity: IdentityFacts,
    facts: RwLock<Facts>,
    hierarchy: RwLock<Arc<Hierarchy>>,
    compiled: RwLock<Arc<CompiledHierarchy>>,
    loader: Arc<dyn ArtifactLoader>,
    class_list_key: String,
    classes: InstanceCache<String>,
    resources: InstanceCache<(String, String)>,
    functions: SingleFlight<String, Arc<Definition>, EvalError>,
    hiera_sources: Mutex<FxHashMap<(HieraSourceKind, String), usize>>,
}

impl NodeContext {
    pub fn new(
        certname: &str,
        facts: Facts,
        hierarchy: Arc<Hierarchy>,
        loader: Arc<dyn ArtifactLoader>,
    ) -> Result<Self, HieraError> {
        let identity = IdentityFacts::from_certname(certname);
        let compiled = CompiledHierarchy::compile(&hierarchy, &facts, &identity.to_facts())?;
        Ok(NodeContext {
            identity,
            facts: RwLock::new(facts),
            hierarchy: RwLock::new(hierarchy),
            compiled: RwLock::new(Arc::new(compiled)),
            loader,
            class_list_key: DEFAULT_CLASS_LIST_KEY.to_string(),
            classes: SingleFlight::new(),
            resources: SingleFlight::new(),
            functions: SingleFlight::new(),
            hiera_sources: Mutex::new(FxHashMap::default()),
        })
    }

    #[must_use]
    pub fn with_class_list_key(mut self, key: impl Into<String>) -> Self {
        self.class_list_key = key.into();
        self
    }

    pub fn certname(&self) -> &str {
        &self.identity.certname
    }

    pub fn identity(&self) -> &IdentityFacts {
        &self.identity
    }

    /// Effective facts, including data-file overrides.
    pub fn facts(&self) -> Facts {
        self.compiled.read().facts().clone()
    }

    /// `certname`, `hostname` or `domain` from the node's identity. Real
    /// facts of the same name take precedence over these.
    fn identity_fact(&self, name: &str) -> Option<Value> {
        match name {
            "certname" => Some(Value::string(&self.identity.certname)),
            "hostname" => Some(Value::string(&self.identity.hostname)),
            "domain" => Some(Value::string(&self.identity.domain)),
            _ => None,
        }
    }

    /// The hierarchy as currently compiled for this node.
    pub fn hierarchy(&self) -> Arc<CompiledHierarchy> {
        Arc::clone(&self.compiled.read())
    }

    /// Resolve one title of a defined type.
    pub fn resolve_resource(
        &self,
        type_name: &str,
        title: &str,
    ) -> Result<Arc<ClassInstance>, EvalError> {
        let type_name = normalize(type_name);
        let key = (type_name.clone(), title.to_string());
        self.resources.get_or_try_init(
            &key,
            || EvalError::Cycle {
                kind: DefinitionKind::DefinedType,
                name: format!("{type_name}[{title}]"),
            },
            |pending| {
                self.build_resource(&type_name, title, pending).map_err(|e| {
                    CompilationError::new(
                        DefinitionKind::DefinedType,
                        format!("{type_name}[{title}]"),
                        e,
                    )
                    .into()
                })
            },
        )
    }

    /// Existence and provenance of a global variable.
    pub fn has_global(&self, name: &str) -> GlobalLookup {
        self.has_global_variable(name)
    }

    /// A global variable with the level that defined it, if any.
    pub fn get_global(&self, name: &str) -> Option<(Value, Option<usize>)> {
        let level = self.has_global_variable(name).level();
        self.get_global_variable(name).map(|value| (value, level))
    }

    /// Classes named by the class-list key, each at the highest-priority
    /// level that lists it.
    pub fn included_classes(&self) -> Vec<(String, usize)> {
        let compiled = self.hierarchy();
        let mut classes: IndexMap<String, usize> = IndexMap::new();
        for (value, level) in compiled.lookup_all(&self.class_list_key) {
            for name in class_names(&value) {
                classes.entry(normalize(&name)).or_insert(level);
            }
        }
        for (name, level) in &classes {
            self.register_hiera_source(HieraSourceKind::Class, name, *level);
        }
        classes.into_iter().collect()
    }

    /// Add `class` to the class list at `level`.
    pub fn assign_class(&self, class: &str, level: usize) -> Result<(), EngineError> {
        let class = normalize(class);
        let compiled = self.hierarchy();
        let mut names = self.class_list_at(&compiled, level)?;
        if names.iter().any(|n| normalize(n) == class) {
            return Ok(());
        }
        names.push(class.clone());
        compiled.assign_raw(level, &self.class_list_key, string_array(&names))?;
        self.register_hiera_source(HieraSourceKind::Class, &class, level);
        Ok(())
    }

    /// Remove `class` from the class list at `level`.
    pub fn remove_class(&self, class: &str, level: usize) -> Result<bool, EngineError> {
        let class = normalize(class);
        let compiled = self.hierarchy();
        let names = self.class_list_at(&compiled, level)?;
        let kept: Vec<String> = names
            .iter()
            .filter(|n| normalize(n) != class)
            .cloned()
            .collect();
        if kept.len() == names.len() {
            return Ok(false);
        }
        if kept.is_empty() {
            compiled.remove(level, &self.class_list_key)?;
        } else {
            compiled.assign_raw(level, &self.class_list_key, string_array(&kept))?;
        }
        self.hiera_sources
            .lock()
            .remove(&(HieraSourceKind::Class, class));
        Ok(true)
    }

    /// Override `class::property` at `level` and drop the stale instance.
    pub fn set_property(
        &self,
        class: &str,
        property: &str,
        value: Value,
        level: usize,
    ) -> Result<(), EngineError> {
        let class = normalize(class);
        self.hierarchy()
            .assign(level, &format!("{class}::{property}"), value)?;
        self.invalidate_class(&class);
        Ok(())
    }

    pub fn remove_property(
        &self,
        class: &str,
        property: &str,
        level: usize,
    ) -> Result<Option<Value>, EngineError> {
        let class = normalize(class);
        let key = format!("{class}::{property}");
        let removed = self.hierarchy().remove(level, &key)?;
        self.hiera_sources
            .lock()
            .remove(&(HieraSourceKind::Property, key));
        self.invalidate_class(&class);
        Ok(removed)
    }

    /// Level that contributed `key`, as recorded during resolution.
    pub fn hiera_source(&self, kind: HieraSourceKind, key: &str) -> Option<usize> {
        self.hiera_sources
            .lock()
            .get(&(kind, normalize(key)))
            .copied()
    }

    /// Replace the node's facts; everything is recompiled.
    pub fn set_facts(&self, facts: Facts) -> Result<(), HieraError> {
        *self.facts.write() = facts;
        self.invalidate_all()
    }

    /// Use a new hierarchy document; everything is recompiled.
    pub fn set_hierarchy(&self, hierarchy: Arc<Hierarchy>) -> Result<(), HieraError> {
        *self.hierarchy.write() = hierarchy;
        self.invalidate_all()
    }

    /// Evict `name` and, transitively, every parent it inherits from.
    pub fn invalidate_class(&self, name: &str) {
        let mut next = Some(normalize(name));
        while let Some(name) = next.take() {
            if let Some(instance) = self.classes.invalidate(&name) {
                tracing::debug!(certname = %self.certname(), class = %name, "invalidated");
                next = instance.parent().map(normalize);
            }
        }
    }

    pub fn invalidate_resource(&self, type_name: &str, title: &str) {
        self.resources
            .invalidate(&(normalize(type_name), title.to_string()));
    }

    pub fn invalidate_function(&self, name: &str) {
        self.functions.invalidate(&normalize(name));
    }

    /// Clear every cache and recompile the hierarchy.
    pub fn invalidate_all(&self) -> Result<(), HieraError> {
        let hierarchy = Arc::clone(&self.hierarchy.read());
        let compiled = {
            let facts = self.facts.read();
            CompiledHierarchy::compile(&hierarchy, &facts, &self.identity.to_facts())?
        };
        *self.compiled.write() = Arc::new(compiled);
        self.classes.clear();
        self.resources.clear();
        self.functions.clear();
        self.hiera_sources.lock().clear();
        tracing::debug!(certname = %self.certname(), "invalidated all");
        Ok(())
    }

    /// Names of the classes currently resolved.
    pub fn resolved_classes(&self) -> Vec<String> {
        let mut names = self.classes.keys();
        names.sort();
        names
    }

    /// Resolve `name` for display; the class becomes public.
    pub fn dump_class(&self, name: &str) -> Result<ClassDump, EvalError> {
        let instance = self.resolve_class(name)?;
        instance.mark_public();
        let included_at = self.hiera_source(HieraSourceKind::Class, instance.name());
        Ok(ClassDump::of(&instance, included_at))
    }

    pub fn dump_resource(&self, type_name: &str, title: &str) -> Result<ClassDump, EvalError> {
        let instance = self.resolve_resource(type_name, title)?;
        instance.mark_public();
        Ok(ClassDump::of(&instance, None))
    }

    fn build_class(
        &self,
        name: &str,
        pending: &Pending<'_, Arc<ClassInstance>, EvalError>,
    ) -> Result<Arc<ClassInstance>, EvalError> {
        let definition = self.load(DefinitionKind::Class, name)?;
        let instance = Arc::new(ClassInstance::class(definition));
        pending.publish(Arc::clone(&instance));
        instance.resolve(self)?;
        Ok(instance)
    }

    fn build_resource(
        &self,
        type_name: &str,
        title: &str,
        pending: &Pending<'_, Arc<ClassInstance>, EvalError>,
    ) -> Result<Arc<ClassInstance>, EvalError> {
        let definition = self.load(DefinitionKind::DefinedType, type_name)?;
        let seeds = self.resource_seeds(type_name, title);
        let instance = Arc::new(ClassInstance::defined_type(definition, title, seeds));
        pending.publish(Arc::clone(&instance));
        instance.resolve(self)?;
        Ok(instance)
    }

    fn load(&self, kind: DefinitionKind, name: &str) -> Result<Arc<Definition>, EvalError> {
        self.loader
            .load(kind, name)
            .map_err(|e| e.into_eval(kind, name))?
            .ok_or_else(|| EvalError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    fn class_list_at(
        &self,
        compiled: &CompiledHierarchy,
        level: usize,
    ) -> Result<Vec<String>, EngineError> {
        match compiled.get_at(level, &self.class_list_key)? {
            None | Some(Value::Undef) => Ok(Vec::new()),
            Some(value @ (Value::Array(_) | Value::String(_))) => Ok(class_names(&value)),
            Some(other) => Err(EngineError::ClassList {
                level,
                value: other.to_string(),
            }),
        }
    }

    /// Overrides for one title from the first level that defines it.
    fn resource_seeds(&self, type_name: &str, title: &str) -> IndexMap<String, Seed> {
        let compiled = self.hierarchy();
        for (value, level) in compiled.lookup_all(RESOURCES_KEY) {
            let Value::Hash(types) = value else {
                continue;
            };
            let titles = types
                .iter()
                .find(|(name, _)| normalize(name) == type_name)
                .map(|(_, titles)| titles);
            let Some(Value::Hash(titles)) = titles else {
                continue;
            };
            let Some(Value::Hash(params)) = titles.get(title) else {
                continue;
            };
            return params
                .iter()
                .map(|(param, value)| {
                    let seed = Seed {
                        value: value.clone(),
                        level: Some(level),
                    };
                    (param.clone(), seed)
                })
                .collect();
        }
        IndexMap::new()
    }
}

impl Resolver for NodeContext {
    fn resolve_class(&self, name: &str) -> Result<Arc<ClassInstance>, EvalError> {
        let name = normalize(name);
        self.classes.get_or_try_init(
            &name,
            || EvalError::Cycle {
                kind: DefinitionKind::Class,
                name: name.clone(),
            },
            |pending| {
                tracing::debug!(certname = %self.certname(), class = %name, "loading");
                self.build_class(&name, pending)
                    .map_err(|e| CompilationError::new(DefinitionKind::Class, &name, e).into())
            },
        )
    }

    fn resolve_function(&self, name: &str) -> Result<Option<Arc<Definition>>, EvalError> {
        let name = normalize(name);
        let loaded = self.functions.get_or_try_init(
            &name,
            || EvalError::Cycle {
                kind: DefinitionKind::Function,
                name: name.clone(),
            },
            |_| self.load(DefinitionKind::Function, &name),
        );
        match loaded {
            Ok(definition) => Ok(Some(definition)),
            Err(EvalError::NotFound { .. }) => Ok(None),
            Err(e) => Err(CompilationError::new(DefinitionKind::Function, &name, e).into()),
        }
    }

    fn get_global_variable(&self, name: &str) -> Option<Value> {
        let name = name.trim_start_matches("::");
        match name {
            "facts" => return Some(Value::Hash(self.facts())),
            "trusted" => return Some(Value::Hash(self.identity.to_facts())),
            _ => {}
        }
        if let Some(value) = self.compiled.read().facts().get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.identity_fact(name) {
            return Some(value);
        }
        self.hierarchy().lookup(name).map(|(value, _)| value)
    }

    fn has_global_variable(&self, name: &str) -> GlobalLookup {
        let name = name.trim_start_matches("::");
        if matches!(name, "facts" | "trusted")
            || self.compiled.read().facts().contains_key(name)
            || self.identity_fact(name).is_some()
        {
            return GlobalLookup::ExistsUnknownLevel;
        }
        self.hierarchy()
            .lookup(name)
            .map_or(GlobalLookup::Missing, |(_, level)| GlobalLookup::Level(level))
    }

    fn register_hiera_source(&self, kind: HieraSourceKind, key: &str, level: usize) {
        self.hiera_sources
            .lock()
            .insert((kind, normalize(key)), level);
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("certname", &self.identity.certname)
            .field("classes", &self.classes.len())
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

/// Definition names are case-insensitive and may carry a leading `::`.
fn normalize(name: &str) -> String {
    name.trim_start_matches("::").to_ascii_lowercase()
}

fn class_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(name) => vec![name.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn string_array(names: &[String]) -> Value {
    Value::Array(names.iter().map(Value::string).collect())
}
