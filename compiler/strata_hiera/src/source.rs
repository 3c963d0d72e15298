//! YAML backing data files.
//!
//! A data file is a flat mapping of keys to values, optionally preceded by a
//! comment block. Comment lines of the form `# key = <json>` are fact
//! overrides for the node the file belongs to:
//!
//! ```yaml
//! # os = {"family": "RedHat"}
//! # role = "db"
//! ntp::servers:
//!   - 0.pool.ntp.org
//! ```
//!
//! The comment block is kept verbatim and written back on save.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value as Yaml};
use strata_ir::Value;

use crate::errors::HieraError;

/// One backing data file, held in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSource {
    path: PathBuf,
    header: String,
    data: IndexMap<String, Value>,
}

impl DataSource {
    /// An empty source that will be created at `path` on first save.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        DataSource {
            path: path.into(),
            header: String::new(),
            data: IndexMap::new(),
        }
    }

    /// Read the file at `path`; `Ok(None)` when it does not exist.
    pub fn open(path: &Path) -> Result<Option<Self>, HieraError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HieraError::io(path, e)),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self, HieraError> {
        let path = path.into();
        let header: String = text
            .lines()
            .take_while(|line| line.trim_start().starts_with('#'))
            .flat_map(|line| [line, "\n"])
            .collect();

        let raw: Yaml = serde_yaml::from_str(text).map_err(|e| HieraError::yaml(&path, e))?;
        let data = match raw {
            Yaml::Null => IndexMap::new(),
            Yaml::Mapping(map) => map
                .iter()
                .map(|(k, v)| (key_string(k), yaml_to_value(v)))
                .collect(),
            other => {
                return Err(HieraError::yaml(
                    &path,
                    format!("expected a mapping, found {}", kind_of(&other)),
                ))
            }
        };
        Ok(DataSource { path, header, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Remove `key`, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    /// Write the source back, creating parent directories as needed.
    pub fn save(&self) -> Result<(), HieraError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HieraError::io(parent, e))?;
        }
        let mapping: Mapping = self
            .data
            .iter()
            .map(|(k, v)| (Yaml::String(k.clone()), value_to_yaml(v)))
            .collect();
        let body = if mapping.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(&mapping).map_err(|e| HieraError::yaml(&self.path, e))?
        };
        let mut text = self.header.clone();
        text.push_str(&body);
        std::fs::write(&self.path, text).map_err(|e| HieraError::io(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), keys = self.data.len(), "saved data source");
        Ok(())
    }

    /// Fact overrides declared in the leading comment block.
    pub fn fact_overrides(&self) -> IndexMap<String, Value> {
        let mut facts = IndexMap::new();
        for line in self.header.lines() {
            let line = line.trim_start().trim_start_matches('#').trim();
            let Some((key, literal)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(literal.trim()) {
                Ok(json) => {
                    facts.insert(key.to_string(), Value::from_json(&json));
                }
                Err(e) => {
                    tracing::debug!(
                        path = %self.path.display(),
                        key,
                        error = %e,
                        "ignoring fact override with invalid literal"
                    );
                }
            }
        }
        facts
    }
}

fn kind_of(yaml: &Yaml) -> &'static str {
    match yaml {
        Yaml::Null => "null",
        Yaml::Bool(_) => "a boolean",
        Yaml::Number(_) => "a number",
        Yaml::String(_) => "a string",
        Yaml::Sequence(_) => "a sequence",
        Yaml::Mapping(_) => "a mapping",
        Yaml::Tagged(_) => "a tagged value",
    }
}

fn key_string(key: &Yaml) -> String {
    match key {
        Yaml::String(s) => s.clone(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => "~".to_string(),
        other => yaml_to_value(other).to_string(),
    }
}

/// Convert a YAML node into a runtime value.
pub fn yaml_to_value(yaml: &Yaml) -> Value {
    match yaml {
        Yaml::Null => Value::Undef,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::Array(items.iter().map(yaml_to_value).collect()),
        Yaml::Mapping(map) => Value::Hash(
            map.iter()
                .map(|(k, v)| (key_string(k), yaml_to_value(v)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_value(&tagged.value),
    }
}

/// Convert a runtime value into a YAML node. Non-data values are written
/// in their string form.
pub fn value_to_yaml(value: &Value) -> Yaml {
    match value {
        Value::Undef => Yaml::Null,
        Value::Bool(b) => Yaml::Bool(*b),
        Value::Integer(i) => Yaml::Number((*i).into()),
        Value::Float(f) => Yaml::Number((*f).into()),
        Value::String(s) => Yaml::String(s.clone()),
        Value::Array(items) => Yaml::Sequence(items.iter().map(value_to_yaml).collect()),
        Value::Hash(map) => Yaml::Mapping(
            map.iter()
                .map(|(k, v)| (Yaml::String(k.clone()), value_to_yaml(v)))
                .collect(),
        ),
        Value::Default | Value::Type(_) | Value::Regex(_) | Value::Resource { .. } => {
            Yaml::String(value.to_string())
        }
    }
}
