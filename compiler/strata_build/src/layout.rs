//! Where sources live and where their artifacts go.
//!
//! ```text
//! <modules>/ntp/manifests/init.pp        class ntp
//! <modules>/ntp/manifests/server/pool.pp class ntp::server::pool
//! <modules>/ntp/functions/servers.pp     function ntp::servers
//!
//! <cache>/ntp/manifests/init.json        artifact of the first
//! ```

use std::path::{Path, PathBuf};

/// Source file extension.
pub const SOURCE_EXTENSION: &str = "pp";
/// Artifact file extension.
pub const ARTIFACT_EXTENSION: &str = "json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactLayout {
    modules: PathBuf,
    cache: PathBuf,
}

impl ArtifactLayout {
    pub fn new(modules: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        ArtifactLayout {
            modules: modules.into(),
            cache: cache.into(),
        }
    }

    pub fn modules(&self) -> &Path {
        &self.modules
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    /// Artifact path for `source`, or `None` if it is outside the module tree.
    pub fn artifact_for(&self, source: &Path) -> Option<PathBuf> {
        let relative = source.strip_prefix(&self.modules).ok()?;
        Some(self.cache.join(relative).with_extension(ARTIFACT_EXTENSION))
    }

    /// Autoload location of a class or defined type.
    pub fn class_source(&self, name: &str) -> Option<PathBuf> {
        let mut segments = split_name(name)?;
        let module = segments.remove(0);
        let mut path = self.modules.join(module).join("manifests");
        if segments.is_empty() {
            path.push("init");
        } else {
            path.extend(segments);
        }
        Some(path.with_extension(SOURCE_EXTENSION))
    }

    /// Autoload location of a function. Functions must be namespaced.
    pub fn function_source(&self, name: &str) -> Option<PathBuf> {
        let mut segments = split_name(name)?;
        if segments.len() < 2 {
            return None;
        }
        let module = segments.remove(0);
        let mut path = self.modules.join(module).join("functions");
        path.extend(segments);
        Some(path.with_extension(SOURCE_EXTENSION))
    }
}

/// Lowercased `::` segments; `None` for empty or malformed names.
fn split_name(name: &str) -> Option<Vec<String>> {
    let name = name.trim_start_matches("::");
    let segments: Vec<String> = name.split("::").map(str::to_ascii_lowercase).collect();
    if segments.iter().any(|s| s.is_empty() || s.contains(['/', '\\', '.'])) {
        return None;
    }
    Some(segments)
}
