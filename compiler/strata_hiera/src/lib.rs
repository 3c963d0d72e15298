//! Strata Hiera - the override-priority hierarchy.
//!
//! - [`Hierarchy`]: the parsed priority document (schema v3 or v5)
//! - [`interpolate`]: `%{a.b.c}` path templates against node facts
//! - [`CompiledHierarchy`]: one node's ordered data sources with the
//!   lookup/write contract
//! - [`DataSource`]: a YAML data file and its fact-override header
//! - [`Encryptor`]: envelope encryption for protected levels

mod compiled;
mod document;
mod encryption;
mod errors;
mod interpolate;
mod source;

pub use compiled::{CompiledEntry, CompiledHierarchy};
pub use document::{EncryptionSettings, Hierarchy, HierarchyEntry};
pub use encryption::{Encryptor, ENVELOPE_SCHEME};
pub use errors::HieraError;
pub use interpolate::{interpolate, interpolate_path};
pub use source::{value_to_yaml, yaml_to_value, DataSource};
