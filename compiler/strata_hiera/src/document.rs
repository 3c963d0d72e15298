//! Override-priority document parsing.
//!
//! Two schema versions are accepted:
//!
//! ```text
//! # version 5                              # version 3 (default)
//! version: 5                               :hierarchy:
//! defaults:                                  - "nodes/%{::certname}"
//!   datadir: data                            - common
//! hierarchy:                               :yaml:
//!   - name: "Per-node data"                  :datadir: hieradata
//!     path: "nodes/%{trusted.certname}.yaml"
//!   - name: "OS"
//!     paths: ["os/%{os.family}.yaml", "os/default.yaml"]
//! ```
//!
//! Legacy `:`-prefixed keys are normalized before either schema is read.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value as Yaml};

use crate::errors::HieraError;

/// Asymmetric encryption parameters for a level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionSettings {
    pub public_key: PathBuf,
    pub private_key: Option<PathBuf>,
}

/// One level of the hierarchy, before node-specific interpolation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HierarchyEntry {
    pub name: String,
    pub path_template: String,
    /// Overrides the hierarchy's default data directory.
    pub datadir: Option<PathBuf>,
    /// Overrides the hierarchy's default encryption settings.
    pub encryption: Option<EncryptionSettings>,
}

impl HierarchyEntry {
    pub fn new(name: impl Into<String>, path_template: impl Into<String>) -> Self {
        HierarchyEntry {
            name: name.into(),
            path_template: path_template.into(),
            datadir: None,
            encryption: None,
        }
    }
}

/// A parsed hierarchy document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hierarchy {
    pub version: u8,
    pub datadir: PathBuf,
    pub encryption: Option<EncryptionSettings>,
    /// Index 0 is the highest priority.
    pub entries: Vec<HierarchyEntry>,
}

impl Hierarchy {
    /// Used when an environment has no hierarchy document.
    pub fn default_for(root: &Path) -> Self {
        Hierarchy {
            version: 5,
            datadir: root.join("data"),
            encryption: None,
            entries: vec![
                HierarchyEntry::new("Per-node data", "nodes/%{trusted.certname}.yaml"),
                HierarchyEntry::new("Common data", "common.yaml"),
            ],
        }
    }

    /// Read the document at `path`, or `Ok(None)` when it does not exist.
    pub fn load(path: &Path, root: &Path) -> Result<Option<Self>, HieraError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, root).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HieraError::io(path, e)),
        }
    }

    /// Parse a document; relative directories are joined to `root`.
    pub fn parse(text: &str, root: &Path) -> Result<Self, HieraError> {
        let raw: Yaml =
            serde_yaml::from_str(text).map_err(|e| HieraError::Document(e.to_string()))?;
        let Yaml::Mapping(doc) = strip_colons(raw) else {
            return Err(HieraError::Document("expected a mapping".to_string()));
        };

        let version = match doc.get("version") {
            None => 3,
            Some(Yaml::Number(n)) => n.as_u64().unwrap_or_default(),
            Some(Yaml::String(s)) => s.trim().parse().unwrap_or_default(),
            Some(_) => 0,
        };
        match version {
            3 => Ok(parse_v3(&doc, root)),
            5 => parse_v5(&doc, root),
            other => Err(HieraError::Document(format!(
                "unsupported hierarchy version {other}"
            ))),
        }
    }
}

/// Remove a leading `:` from every mapping key, recursively.
fn strip_colons(value: Yaml) -> Yaml {
    match value {
        Yaml::Mapping(map) => Yaml::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Yaml::String(s) => {
                            Yaml::String(s.strip_prefix(':').map_or(s.clone(), str::to_string))
                        }
                        other => other,
                    };
                    (k, strip_colons(v))
                })
                .collect(),
        ),
        Yaml::Sequence(items) => Yaml::Sequence(items.into_iter().map(strip_colons).collect()),
        other => other,
    }
}

fn get<'a>(map: &'a Mapping, path: &[&str]) -> Option<&'a Yaml> {
    let (first, rest) = path.split_first()?;
    let value = map.get(*first)?;
    if rest.is_empty() {
        return Some(value);
    }
    match value {
        Yaml::Mapping(inner) => get(inner, rest),
        _ => None,
    }
}

fn get_str<'a>(map: &'a Mapping, path: &[&str]) -> Option<&'a str> {
    get(map, path).and_then(Yaml::as_str)
}

fn resolve_dir(root: &Path, dir: &str) -> PathBuf {
    let dir = Path::new(dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}

/// `pkcs7_public_key`/`pkcs7_private_key` out of an options-like mapping.
fn encryption(map: Option<&Yaml>, root: &Path) -> Option<EncryptionSettings> {
    let Some(Yaml::Mapping(map)) = map else {
        return None;
    };
    let public_key = get_str(map, &["pkcs7_public_key"])?;
    Some(EncryptionSettings {
        public_key: resolve_dir(root, public_key),
        private_key: get_str(map, &["pkcs7_private_key"]).map(|p| resolve_dir(root, p)),
    })
}

fn parse_v5(doc: &Mapping, root: &Path) -> Result<Hierarchy, HieraError> {
    let datadir = resolve_dir(root, get_str(doc, &["defaults", "datadir"]).unwrap_or("data"));
    let default_encryption = encryption(get(doc, &["defaults", "options"]), root);

    let mut entries = Vec::new();
    let levels = match doc.get("hierarchy") {
        Some(Yaml::Sequence(levels)) => levels.as_slice(),
        Some(_) => return Err(HieraError::Document("'hierarchy' must be a list".to_string())),
        None => &[],
    };
    for level in levels {
        match level {
            Yaml::String(path) => entries.push(HierarchyEntry::new(path.as_str(), path.as_str())),
            Yaml::Mapping(level) => {
                let name = get_str(level, &["name"]).unwrap_or_default().to_string();
                let datadir = get_str(level, &["datadir"]).map(|d| resolve_dir(root, d));
                let encryption = encryption(level.get("options"), root);
                let mut paths: Vec<String> = Vec::new();
                if let Some(path) = get_str(level, &["path"]) {
                    paths.push(path.to_string());
                }
                if let Some(Yaml::Sequence(many)) = level.get("paths") {
                    paths.extend(many.iter().filter_map(Yaml::as_str).map(str::to_string));
                }
                if paths.is_empty() {
                    tracing::warn!(level = %name, "hierarchy level has no path or paths, skipped");
                }
                for path in paths {
                    entries.push(HierarchyEntry {
                        name: if name.is_empty() { path.clone() } else { name.clone() },
                        path_template: path,
                        datadir: datadir.clone(),
                        encryption: encryption.clone(),
                    });
                }
            }
            other => {
                return Err(HieraError::Document(format!(
                    "unexpected hierarchy level {other:?}"
                )))
            }
        }
    }

    Ok(Hierarchy {
        version: 5,
        datadir,
        encryption: default_encryption,
        entries,
    })
}

fn parse_v3(doc: &Mapping, root: &Path) -> Hierarchy {
    let datadir = get_str(doc, &["yaml", "datadir"])
        .or_else(|| get_str(doc, &["eyaml", "datadir"]))
        .unwrap_or("hieradata");
    let default_encryption = encryption(doc.get("eyaml"), root);

    let templates: Vec<&str> = match doc.get("hierarchy") {
        Some(Yaml::Sequence(levels)) => levels.iter().filter_map(Yaml::as_str).collect(),
        Some(Yaml::String(single)) => vec![single.as_str()],
        _ => Vec::new(),
    };
    let entries = templates
        .into_iter()
        .map(|template| {
            // Only text after the last interpolation can carry an extension.
            let tail = template.rsplit('}').next().unwrap_or(template);
            let path = if Path::new(tail).extension().is_some() {
                template.to_string()
            } else {
                format!("{template}.yaml")
            };
            HierarchyEntry::new(template, path)
        })
        .collect();

    Hierarchy {
        version: 3,
        datadir: resolve_dir(root, datadir),
        encryption: default_encryption,
        entries,
    }
}
