//! Node-specific compiled hierarchy.
//!
//! Compiling interpolates every entry's path template against the node's
//! facts and opens whichever backing files exist. Data files may override
//! facts in their header; when any do, the overrides are merged over the
//! node's facts and the hierarchy is compiled once more so that paths see
//! the overridden values.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use strata_ir::Value;

use crate::document::{EncryptionSettings, Hierarchy, HierarchyEntry};
use crate::encryption::Encryptor;
use crate::errors::HieraError;
use crate::interpolate::interpolate_path;
use crate::source::DataSource;

/// A hierarchy entry bound to one node.
#[derive(Debug)]
pub struct CompiledEntry {
    entry: HierarchyEntry,
    path: PathBuf,
    encryption: Option<EncryptionSettings>,
    /// `None` until a read finds the file or a write creates it.
    source: RwLock<Option<DataSource>>,
}

impl CompiledEntry {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn path_template(&self) -> &str {
        &self.entry.path_template
    }

    /// Interpolated location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encryption(&self) -> Option<&EncryptionSettings> {
        self.encryption.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.source.read().is_some()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.source.read().as_ref().and_then(|s| s.get(key).cloned())
    }

    /// Re-read the file, set `key` and save. The in-memory copy is replaced
    /// by what was written.
    fn write(&self, key: &str, value: Value) -> Result<(), HieraError> {
        let _file = FILE_WRITES.lock();
        let mut guard = self.source.write();
        let mut source =
            DataSource::open(&self.path)?.unwrap_or_else(|| DataSource::empty(&self.path));
        source.set(key, value);
        source.save()?;
        *guard = Some(source);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<Value>, HieraError> {
        let _file = FILE_WRITES.lock();
        let mut guard = self.source.write();
        let Some(mut source) = DataSource::open(&self.path)? else {
            *guard = None;
            return Ok(None);
        };
        let removed = source.remove(key);
        if removed.is_some() {
            source.save()?;
        }
        *guard = Some(source);
        Ok(removed)
    }
}

/// Serializes read-modify-write of data files. Nodes that share a level
/// each hold their own copy of its file.
static FILE_WRITES: Mutex<()> = parking_lot::const_mutex(());

/// Ordered data sources for one node. Level 0 has the highest priority.
#[derive(Debug)]
pub struct CompiledHierarchy {
    entries: Vec<CompiledEntry>,
    facts: IndexMap<String, Value>,
}

impl CompiledHierarchy {
    pub fn compile(
        hierarchy: &Hierarchy,
        facts: &IndexMap<String, Value>,
        trusted: &IndexMap<String, Value>,
    ) -> Result<Self, HieraError> {
        let entries = compile_entries(hierarchy, facts, trusted)?;

        let mut overrides: IndexMap<String, Value> = IndexMap::new();
        for entry in entries.iter().rev() {
            if let Some(source) = entry.source.read().as_ref() {
                overrides.extend(source.fact_overrides());
            }
        }
        if overrides.is_empty() {
            return Ok(CompiledHierarchy {
                entries,
                facts: facts.clone(),
            });
        }

        tracing::debug!(count = overrides.len(), "data files override facts, recompiling");
        let mut merged = facts.clone();
        merged.extend(overrides);
        let entries = compile_entries(hierarchy, &merged, trusted)?;
        Ok(CompiledHierarchy {
            entries,
            facts: merged,
        })
    }

    /// Facts after data-file overrides were applied.
    pub fn facts(&self) -> &IndexMap<String, Value> {
        &self.facts
    }

    pub fn entries(&self) -> &[CompiledEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First level that defines `key`, with its value.
    pub fn lookup(&self, key: &str) -> Option<(Value, usize)> {
        self.entries
            .iter()
            .enumerate()
            .find_map(|(level, entry)| entry.get(key).map(|value| (value, level)))
    }

    /// Every level that defines `key`, highest priority first.
    pub fn lookup_all(&self, key: &str) -> Vec<(Value, usize)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(level, entry)| entry.get(key).map(|value| (value, level)))
            .collect()
    }

    pub fn get_at(&self, level: usize, key: &str) -> Result<Option<Value>, HieraError> {
        Ok(self.entry(level)?.get(key))
    }

    /// Write `value` to one level, encrypting it when the level is
    /// configured for encryption.
    pub fn assign(&self, level: usize, key: &str, value: Value) -> Result<(), HieraError> {
        let entry = self.entry(level)?;
        let value = match entry.encryption() {
            Some(settings) => {
                let plaintext = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_json().to_string(),
                };
                Value::String(Encryptor::load(settings)?.encrypt(&plaintext)?)
            }
            None => value,
        };
        entry.write(key, value)
    }

    /// Write `value` to one level as is.
    pub fn assign_raw(&self, level: usize, key: &str, value: Value) -> Result<(), HieraError> {
        self.entry(level)?.write(key, value)
    }

    pub fn remove(&self, level: usize, key: &str) -> Result<Option<Value>, HieraError> {
        self.entry(level)?.remove(key)
    }

    fn entry(&self, level: usize) -> Result<&CompiledEntry, HieraError> {
        self.entries.get(level).ok_or(HieraError::LevelOutOfRange {
            level,
            len: self.entries.len(),
        })
    }
}

/// Interpolation scope: identity and facts at the root, plus `facts` and
/// `trusted`. A real fact shadows the identity value of the same name.
fn scope(facts: &IndexMap<String, Value>, trusted: &IndexMap<String, Value>) -> Value {
    let mut root = trusted.clone();
    root.extend(facts.iter().map(|(k, v)| (k.clone(), v.clone())));
    root.insert("facts".to_string(), Value::Hash(facts.clone()));
    root.insert("trusted".to_string(), Value::Hash(trusted.clone()));
    Value::Hash(root)
}

fn compile_entries(
    hierarchy: &Hierarchy,
    facts: &IndexMap<String, Value>,
    trusted: &IndexMap<String, Value>,
) -> Result<Vec<CompiledEntry>, HieraError> {
    let scope = scope(facts, trusted);
    hierarchy
        .entries
        .iter()
        .map(|entry| {
            let datadir = entry.datadir.as_ref().unwrap_or(&hierarchy.datadir);
            let path = datadir.join(interpolate_path(&entry.path_template, &scope));
            let source = DataSource::open(&path)?;
            tracing::trace!(
                level = %entry.name,
                path = %path.display(),
                found = source.is_some(),
                "compiled hierarchy entry"
            );
            Ok(CompiledEntry {
                entry: entry.clone(),
                path,
                encryption: entry
                    .encryption
                    .clone()
                    .or_else(|| hierarchy.encryption.clone()),
                source: RwLock::new(source),
            })
        })
        .collect()
}
