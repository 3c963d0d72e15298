//! The incremental compile pipeline.
//!
//! ```text
//! scan tree ─► stale jobs ─► batches of N ─► rayon pool ─► ExternalCompiler
//!                                               │
//!                                               └─► progress(done, total)
//! ```
//!
//! A failed batch is logged and reported; it never stops the others.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::compiler::ExternalCompiler;
use crate::errors::{BuildError, CompileError};
use crate::layout::ArtifactLayout;
use crate::scan::{self, Job};

/// Default number of sources per compiler invocation.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub layout: ArtifactLayout,
    /// Worker count; `None` uses one less than the available cores.
    pub jobs: Option<usize>,
    pub batch_size: usize,
}

impl PipelineConfig {
    pub fn new(modules: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            layout: ArtifactLayout::new(modules, cache),
            jobs: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs.max(1));
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map_or(1, |n| n.get().saturating_sub(1))
                .max(1)
        })
    }
}

/// Batches completed so far out of the total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Outcome of a full build.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub compiled: usize,
    pub batches: usize,
    pub failures: Vec<CompileError>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    compiler: Arc<dyn ExternalCompiler>,
    /// Serializes on-demand compiles.
    on_demand: Mutex<()>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, compiler: Arc<dyn ExternalCompiler>) -> Self {
        Pipeline {
            config,
            compiler,
            on_demand: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.config.layout
    }

    /// Compile every stale source.
    pub fn build(&self, progress: &(dyn Fn(Progress) + Sync)) -> Result<BuildReport, BuildError> {
        let scan::BuildPlan { jobs, latest } = scan::plan(&self.config.layout)?;
        let batches: Vec<&[Job]> = jobs.chunks(self.config.batch_size).collect();
        let total = batches.len();
        if total == 0 {
            tracing::debug!("all artifacts are fresh");
            return Ok(BuildReport::default());
        }

        let workers = self.config.worker_count();
        tracing::debug!(jobs = jobs.len(), batches = total, workers, "starting build");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("strata-build-{i}"))
            .build()
            .map_err(|e| BuildError::Pool(e.to_string()))?;

        let completed = AtomicUsize::new(0);
        let mut failures: Vec<CompileError> = pool.install(|| {
            batches
                .par_iter()
                .enumerate()
                .filter_map(|(index, batch)| {
                    let result = self.run_batch(index, batch, latest);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(Progress {
                        completed: done,
                        total,
                    });
                    result.err()
                })
                .collect()
        });
        failures.sort_by_key(|f| f.batch);

        Ok(BuildReport {
            compiled: jobs.len(),
            batches: total,
            failures,
        })
    }

    /// Compile `source` now if its artifact is stale.
    ///
    /// Returns whether the compiler ran.
    pub fn ensure_fresh(&self, source: &Path) -> Result<bool, BuildError> {
        let _guard = self.on_demand.lock();
        let artifact = self
            .config
            .layout
            .artifact_for(source)
            .ok_or_else(|| BuildError::OutsideModules {
                path: source.to_path_buf(),
            })?;

        let latest = scan::scan_tree(self.config.layout.modules())?.latest;
        if !scan::is_stale(scan::modified(&artifact)?, latest) {
            return Ok(false);
        }
        tracing::debug!(source = %source.display(), "compiling stale source on demand");
        let job = Job {
            source: source.to_path_buf(),
            artifact,
        };
        self.run_batch(0, std::slice::from_ref(&job), latest)?;
        Ok(true)
    }

    fn run_batch(
        &self,
        index: usize,
        batch: &[Job],
        latest: Option<SystemTime>,
    ) -> Result<(), CompileError> {
        let result = self.compile_batch(batch, latest).map_err(|e| CompileError {
            batch: index,
            message: e.to_string(),
        });
        if let Err(err) = &result {
            tracing::warn!(batch = index, sources = batch.len(), error = %err.message, "batch failed");
        }
        result
    }

    /// Run the compiler, then require every artifact to be at least as new
    /// as `latest`. An artifact left over from an earlier build fails the
    /// batch even when the compiler exited successfully.
    fn compile_batch(&self, batch: &[Job], latest: Option<SystemTime>) -> Result<(), BuildError> {
        for job in batch {
            if let Some(parent) = job.artifact.parent() {
                std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
        }
        self.compiler.compile(batch)?;
        for job in batch {
            let stamp = scan::modified(&job.artifact)?;
            if stamp.is_none() {
                return Err(BuildError::Compiler {
                    program: "compiler".to_string(),
                    message: format!("did not produce {}", job.artifact.display()),
                });
            }
            if scan::is_stale(stamp, latest) {
                return Err(BuildError::Compiler {
                    program: "compiler".to_string(),
                    message: format!("did not refresh {}", job.artifact.display()),
                });
            }
        }
        Ok(())
    }
}
