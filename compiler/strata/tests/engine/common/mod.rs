//! Shared fixtures: artifact builders, a counting loader and a temporary
//! two-level hierarchy.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value as Json};
use strata::{ArtifactLoader, Facts, LoadError, NodeContext};
use strata_hiera::{Hierarchy, HierarchyEntry};
use strata_ir::{decode_artifact, Definition, DefinitionKind};
use tempfile::TempDir;

pub const CERTNAME: &str = "web01.example.com";

/// `{"^": [tag, args...]}`.
pub fn node(tag: &str, args: Vec<Json>) -> Json {
    let mut parts = vec![Json::from(tag)];
    parts.extend(args);
    json!({ "^": parts })
}

/// `{"#": [k1, v1, ...]}`.
pub fn pn_map(entries: Vec<(&str, Json)>) -> Json {
    let flat: Vec<Json> = entries
        .into_iter()
        .flat_map(|(k, v)| [Json::from(k), v])
        .collect();
    json!({ "#": flat })
}

pub fn var(name: &str) -> Json {
    node("$", vec![name.into()])
}

pub fn assign(name: &str, value: Json) -> Json {
    node("=", vec![var(name), value])
}

pub fn param(type_name: Option<&str>, default: Option<Json>) -> Json {
    let mut entries = Vec::new();
    if let Some(t) = type_name {
        entries.push(("type", node("qr", vec![t.into()])));
    }
    if let Some(d) = default {
        entries.push(("value", d));
    }
    pn_map(entries)
}

fn definition(
    tag: &str,
    name: &str,
    parent: Option<&str>,
    params: Vec<(&str, Json)>,
    body: Vec<Json>,
) -> Json {
    let mut entries = vec![("name", Json::from(name))];
    if let Some(parent) = parent {
        entries.push(("parent", parent.into()));
    }
    entries.push(("params", pn_map(params)));
    entries.push(("body", Json::Array(body)));
    node(tag, vec![pn_map(entries)])
}

pub fn class(name: &str, params: Vec<(&str, Json)>, body: Vec<Json>) -> Json {
    definition("class", name, None, params, body)
}

pub fn class_inherits(name: &str, parent: &str, params: Vec<(&str, Json)>, body: Vec<Json>) -> Json {
    definition("class", name, Some(parent), params, body)
}

pub fn define(name: &str, params: Vec<(&str, Json)>, body: Vec<Json>) -> Json {
    definition("define", name, None, params, body)
}

/// `type { title: attr => value, ... }`.
pub fn resource(type_name: &str, title: &str, attributes: Vec<(&str, Json)>) -> Json {
    let ops: Vec<Json> = attributes
        .into_iter()
        .map(|(name, value)| node("=>", vec![name.into(), value]))
        .collect();
    node(
        "resource",
        vec![pn_map(vec![
            ("type", Json::from(type_name)),
            (
                "bodies",
                json!([pn_map(vec![("title", title.into()), ("ops", Json::Array(ops))])]),
            ),
        ])],
    )
}

/// In-memory artifacts keyed by definition name, counting every load.
#[derive(Default)]
pub struct CountingLoader {
    artifacts: Mutex<FxHashMap<String, String>>,
    loads: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside every load so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with(self, name: &str, artifact: &Json) -> Self {
        self.set(name, artifact);
        self
    }

    pub fn set(&self, name: &str, artifact: &Json) {
        self.set_text(name, &artifact.to_string());
    }

    pub fn set_text(&self, name: &str, text: &str) {
        self.artifacts
            .lock()
            .insert(name.to_ascii_lowercase(), text.to_string());
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ArtifactLoader for CountingLoader {
    fn load(&self, kind: DefinitionKind, name: &str) -> Result<Option<Arc<Definition>>, LoadError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        let Some(text) = self.artifacts.lock().get(&name.to_ascii_lowercase()).cloned() else {
            return Ok(None);
        };
        let artifact = decode_artifact(&text).map_err(|source| LoadError::Parse {
            path: PathBuf::from(format!("{name}.json")),
            source,
        })?;
        Ok(artifact.find(kind, name))
    }
}

/// A data directory with two levels: per-node (0) and common (1).
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn datadir(&self) -> PathBuf {
        self.root().join("data")
    }

    pub fn node_file(&self) -> PathBuf {
        self.datadir().join("nodes").join(format!("{CERTNAME}.yaml"))
    }

    pub fn common_file(&self) -> PathBuf {
        self.datadir().join("common.yaml")
    }

    pub fn hierarchy(&self) -> Hierarchy {
        Hierarchy {
            version: 5,
            datadir: self.datadir(),
            encryption: None,
            entries: vec![
                HierarchyEntry::new("Per-node data", "nodes/%{trusted.certname}.yaml"),
                HierarchyEntry::new("Common data", "common.yaml"),
            ],
        }
    }

    /// Write `text` to `data/<relative>`.
    pub fn write_data(&self, relative: &str, text: &str) {
        let path = self.datadir().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    pub fn write_node_data(&self, text: &str) {
        self.write_data(&format!("nodes/{CERTNAME}.yaml"), text);
    }

    pub fn write_common_data(&self, text: &str) {
        self.write_data("common.yaml", text);
    }

    pub fn context(&self, loader: Arc<CountingLoader>) -> NodeContext {
        self.context_with_facts(loader, Facts::new())
    }

    pub fn context_with_facts(&self, loader: Arc<CountingLoader>, facts: Facts) -> NodeContext {
        NodeContext::new(CERTNAME, facts, Arc::new(self.hierarchy()), loader).unwrap()
    }
}
