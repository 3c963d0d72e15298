//! Node facts.

use std::path::PathBuf;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use strata_ir::Value;

use crate::errors::WorkspaceError;

/// Fact name to value.
pub type Facts = IndexMap<String, Value>;

/// Supplies the raw facts of a node.
pub trait FactProvider: Send + Sync {
    fn facts(&self, certname: &str) -> Result<Facts, WorkspaceError>;
}

/// Reads `<dir>/<certname>.json`.
///
/// Both a flat object and the `{"values": {...}}` dump shape are accepted.
/// A node without a file has no facts.
#[derive(Clone, Debug)]
pub struct JsonFactsProvider {
    dir: PathBuf,
}

impl JsonFactsProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFactsProvider { dir: dir.into() }
    }
}

impl FactProvider for JsonFactsProvider {
    fn facts(&self, certname: &str) -> Result<Facts, WorkspaceError> {
        let path = self.dir.join(format!("{certname}.json"));
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(certname, path = %path.display(), "no facts file");
                return Ok(Facts::new());
            }
            Err(e) => return Err(WorkspaceError::new("Unable to read facts", e)),
        };
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| WorkspaceError::new("Malformed facts", format!("{}: {e}", path.display())))?;
        let object = match json.get("values") {
            Some(values @ serde_json::Value::Object(_)) => values,
            _ => &json,
        };
        match Value::from_json(object) {
            Value::Hash(facts) => Ok(facts),
            _ => Err(WorkspaceError::new(
                "Malformed facts",
                format!("{} is not an object", path.display()),
            )),
        }
    }
}

/// Facts held in memory, keyed by certname.
#[derive(Clone, Debug, Default)]
pub struct MemoryFacts {
    nodes: FxHashMap<String, Facts>,
}

impl MemoryFacts {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(mut self, certname: impl Into<String>, facts: Facts) -> Self {
        self.nodes.insert(certname.into(), facts);
        self
    }
}

impl FactProvider for MemoryFacts {
    fn facts(&self, certname: &str) -> Result<Facts, WorkspaceError> {
        Ok(self.nodes.get(certname).cloned().unwrap_or_default())
    }
}

/// Read-only facts derived from the node's certname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityFacts {
    pub certname: String,
    pub hostname: String,
    pub domain: String,
}

impl IdentityFacts {
    /// `web01.example.com` has hostname `web01` and domain `example.com`.
    pub fn from_certname(certname: &str) -> Self {
        let (hostname, domain) = certname.split_once('.').unwrap_or((certname, ""));
        IdentityFacts {
            certname: certname.to_string(),
            hostname: hostname.to_string(),
            domain: domain.to_string(),
        }
    }

    /// The `trusted` hash.
    pub fn to_facts(&self) -> Facts {
        let mut facts = Facts::new();
        facts.insert("certname".to_string(), Value::string(&self.certname));
        facts.insert("domain".to_string(), Value::string(&self.domain));
        facts.insert("hostname".to_string(), Value::string(&self.hostname));
        facts
    }
}
