//! The set of open environments.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::environment::{Environment, EnvironmentConfig};
use crate::errors::WorkspaceError;

/// Owns every open [`Environment`]; nothing is global.
#[derive(Debug, Default)]
pub struct Workspace {
    environments: DashMap<String, Arc<Environment>>,
    warnings: Mutex<Vec<WorkspaceError>>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an environment, replacing any open one with the same name.
    pub fn open_environment(
        &self,
        config: EnvironmentConfig,
    ) -> Result<Arc<Environment>, WorkspaceError> {
        let name = config.name.clone();
        let environment = match Environment::open(config) {
            Ok(environment) => Arc::new(environment),
            Err(e) => {
                self.warnings.lock().push(e.clone());
                return Err(e);
            }
        };
        if self
            .environments
            .insert(name.clone(), Arc::clone(&environment))
            .is_some()
        {
            tracing::debug!(environment = %name, "replaced open environment");
        }
        Ok(environment)
    }

    /// Add an environment that was opened elsewhere.
    pub fn insert_environment(&self, environment: Environment) -> Arc<Environment> {
        let environment = Arc::new(environment);
        self.environments
            .insert(environment.name().to_string(), Arc::clone(&environment));
        environment
    }

    /// Close an environment; its warnings move to the workspace.
    pub fn close_environment(&self, name: &str) -> bool {
        match self.environments.remove(name) {
            Some((_, environment)) => {
                self.warnings.lock().extend(environment.drain_warnings());
                true
            }
            None => false,
        }
    }

    pub fn environment(&self, name: &str) -> Option<Arc<Environment>> {
        self.environments.get(name).map(|e| Arc::clone(&e))
    }

    pub fn environment_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.environments.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Take every collected warning, the environments' included.
    pub fn warnings(&self) -> Vec<WorkspaceError> {
        let mut warnings = std::mem::take(&mut *self.warnings.lock());
        for environment in &self.environments {
            warnings.extend(environment.drain_warnings());
        }
        warnings
    }
}
