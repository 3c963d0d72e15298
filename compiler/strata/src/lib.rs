//! Strata - layered configuration resolution for managed nodes.
//!
//! # Architecture
//!
//! ```text
//! Workspace ─► Environment ─► NodeContext ─► ClassInstance
//!                  │               │
//!                  │               ├─ CompiledHierarchy (strata_hiera)
//!                  │               └─ ArtifactLoader ─► Pipeline (strata_build)
//!                  └─ FactProvider
//! ```
//!
//! - [`Workspace`] / [`Environment`]: explicit owners with open/close lifecycle
//! - [`NodeContext`]: per-node caches and the [`strata_eval::Resolver`] they
//!   resolve against
//! - [`SingleFlight`]: the cache cell shared by concurrent and re-entrant
//!   requests for the same key
//! - [`ClassDump`]: what the editor shows for a class or resource
//!
//! # Tracing
//!
//! Set `RUST_LOG` (for example `RUST_LOG=strata=debug`) and call
//! [`init_tracing`] once at startup.

mod cache;
mod dump;
mod environment;
mod errors;
mod facts;
mod loader;
mod node;
mod workspace;

use std::sync::Once;

pub use cache::{Pending, SingleFlight};
pub use dump::{ClassDump, HintDump, PropertyDump, ResourceDump};
pub use environment::{Environment, EnvironmentConfig};
pub use errors::{EngineError, LoadError, WorkspaceError};
pub use facts::{FactProvider, Facts, IdentityFacts, JsonFactsProvider, MemoryFacts};
pub use loader::{ArtifactLoader, FsArtifactLoader};
pub use node::{NodeContext, DEFAULT_CLASS_LIST_KEY, RESOURCES_KEY};
pub use workspace::Workspace;

static TRACING_INIT: Once = Once::new();

/// Install the hierarchical tracing subscriber.
///
/// Safe to call multiple times; does nothing unless `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{prelude::*, EnvFilter};
        use tracing_tree::HierarchicalLayer;

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(EnvFilter::from_default_env())
                .with(
                    HierarchicalLayer::new(2)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .init();
        }
    });
}
