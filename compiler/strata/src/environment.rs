//! An environment: one module tree, one hierarchy, many nodes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use strata_build::{BuildReport, CommandCompiler, Pipeline, PipelineConfig, Progress};
use strata_hiera::Hierarchy;

use crate::errors::{EngineError, WorkspaceError};
use crate::facts::{FactProvider, Facts, JsonFactsProvider};
use crate::loader::{ArtifactLoader, FsArtifactLoader};
use crate::node::{NodeContext, DEFAULT_CLASS_LIST_KEY};

/// Where an environment keeps things. Relative paths are taken from `root`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub name: String,
    pub root: PathBuf,
    pub modules_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub facts_dir: PathBuf,
    pub hierarchy_file: PathBuf,
    pub class_list_key: String,
    /// External compiler command line; without one, artifacts are only read.
    pub compiler: Option<String>,
    pub jobs: Option<usize>,
}

impl EnvironmentConfig {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        EnvironmentConfig {
            name: name.into(),
            root: root.into(),
            modules_dir: PathBuf::from("modules"),
            cache_dir: PathBuf::from(".strata/artifacts"),
            facts_dir: PathBuf::from("facts"),
            hierarchy_file: PathBuf::from("hiera.yaml"),
            class_list_key: DEFAULT_CLASS_LIST_KEY.to_string(),
            compiler: None,
            jobs: None,
        }
    }

    #[must_use]
    pub fn with_modules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.modules_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_facts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.facts_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_hierarchy_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.hierarchy_file = file.into();
        self
    }

    #[must_use]
    pub fn with_class_list_key(mut self, key: impl Into<String>) -> Self {
        self.class_list_key = key.into();
        self
    }

    #[must_use]
    pub fn with_compiler(mut self, command_line: impl Into<String>) -> Self {
        self.compiler = Some(command_line.into());
        self
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn modules_path(&self) -> PathBuf {
        self.resolve(&self.modules_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.resolve(&self.cache_dir)
    }

    pub fn facts_path(&self) -> PathBuf {
        self.resolve(&self.facts_dir)
    }

    pub fn hierarchy_path(&self) -> PathBuf {
        self.resolve(&self.hierarchy_file)
    }
}

/// An open environment and the node contexts created in it.
pub struct Environment {
    config: EnvironmentConfig,
    hierarchy: Mutex<Arc<Hierarchy>>,
    pipeline: Option<Arc<Pipeline>>,
    loader: Arc<dyn ArtifactLoader>,
    facts: Arc<dyn FactProvider>,
    nodes: DashMap<String, Arc<NodeContext>>,
    warnings: Mutex<Vec<WorkspaceError>>,
}

impl Environment {
    /// Read the hierarchy document and set up the artifact pipeline.
    pub fn open(config: EnvironmentConfig) -> Result<Self, WorkspaceError> {
        let hierarchy = load_hierarchy(&config)?;

        let mut pipeline_config = PipelineConfig::new(config.modules_path(), config.cache_path());
        if let Some(jobs) = config.jobs {
            pipeline_config = pipeline_config.with_jobs(jobs);
        }
        let pipeline = match config.compiler.as_deref() {
            Some(line) => {
                let compiler = CommandCompiler::from_command_line(line).ok_or_else(|| {
                    WorkspaceError::new("Invalid compiler", "the compiler command line is empty")
                })?;
                Some(Arc::new(Pipeline::new(pipeline_config.clone(), Arc::new(compiler))))
            }
            None => None,
        };

        let mut loader = FsArtifactLoader::new(pipeline_config.layout);
        if let Some(pipeline) = &pipeline {
            loader = loader.with_pipeline(Arc::clone(pipeline));
        }

        tracing::debug!(environment = %config.name, root = %config.root.display(), "opened");
        Ok(Environment {
            facts: Arc::new(JsonFactsProvider::new(config.facts_path())),
            config,
            hierarchy: Mutex::new(Arc::new(hierarchy)),
            pipeline,
            loader: Arc::new(loader),
            nodes: DashMap::new(),
            warnings: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn with_fact_provider(mut self, facts: Arc<dyn FactProvider>) -> Self {
        self.facts = facts;
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ArtifactLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> Arc<Hierarchy> {
        Arc::clone(&self.hierarchy.lock())
    }

    /// The context for `certname`, created on first use.
    ///
    /// A failed fact fetch is collected as a warning and the node starts
    /// with no facts.
    pub fn node(&self, certname: &str) -> Result<Arc<NodeContext>, EngineError> {
        if let Some(node) = self.nodes.get(certname) {
            return Ok(Arc::clone(&node));
        }
        let entry = self
            .nodes
            .entry(certname.to_string())
            .or_try_insert_with(|| {
                let facts = self.fetch_facts(certname);
                let node =
                    NodeContext::new(certname, facts, self.hierarchy(), Arc::clone(&self.loader))?
                        .with_class_list_key(self.config.class_list_key.clone());
                tracing::debug!(environment = %self.config.name, certname, "node created");
                Ok::<_, EngineError>(Arc::new(node))
            })?;
        Ok(Arc::clone(&entry))
    }

    /// Drop a node context; returns whether it existed.
    pub fn close_node(&self, certname: &str) -> bool {
        self.nodes.remove(certname).is_some()
    }

    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.iter().map(|n| n.key().clone()).collect();
        names.sort();
        names
    }

    /// Re-read the hierarchy document and recompile every open node.
    pub fn reload_hierarchy(&self) -> Result<(), EngineError> {
        let hierarchy = Arc::new(load_hierarchy(&self.config)?);
        *self.hierarchy.lock() = Arc::clone(&hierarchy);
        for node in &self.nodes {
            node.set_hierarchy(Arc::clone(&hierarchy))?;
        }
        Ok(())
    }

    /// Compile every stale artifact.
    pub fn build(&self, progress: &(dyn Fn(Progress) + Sync)) -> Result<BuildReport, EngineError> {
        let Some(pipeline) = &self.pipeline else {
            return Err(WorkspaceError::new(
                "No compiler",
                format!("environment '{}' has no compiler configured", self.config.name),
            )
            .into());
        };
        let report = pipeline.build(progress)?;
        for failure in &report.failures {
            self.warn(WorkspaceError::new("Build failed", failure));
        }
        Ok(report)
    }

    pub fn warn(&self, warning: WorkspaceError) {
        tracing::warn!(environment = %self.config.name, %warning, "warning");
        self.warnings.lock().push(warning);
    }

    /// Take the collected warnings.
    pub fn drain_warnings(&self) -> Vec<WorkspaceError> {
        std::mem::take(&mut *self.warnings.lock())
    }

    fn fetch_facts(&self, certname: &str) -> Facts {
        match self.facts.facts(certname) {
            Ok(facts) => facts,
            Err(e) => {
                self.warn(WorkspaceError::new(
                    e.title,
                    format!("{certname}: {}", e.message),
                ));
                Facts::new()
            }
        }
    }
}

fn load_hierarchy(config: &EnvironmentConfig) -> Result<Hierarchy, WorkspaceError> {
    let path = config.hierarchy_path();
    match Hierarchy::load(&path, &config.root) {
        Ok(Some(hierarchy)) => Ok(hierarchy),
        Ok(None) => {
            tracing::debug!(path = %path.display(), "no hierarchy document, using default");
            Ok(Hierarchy::default_for(&config.root))
        }
        Err(e) => Err(WorkspaceError::new("Invalid hierarchy", e)),
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.config.name)
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}
