//! The capture-ingestion pipeline: enumerate, extract in parallel, record.
//!
//! Durable state (registry, checkpoint log, output files) is owned by the
//! aggregator on the main thread; the pool only ever talks to it through
//! the result channel.
pub mod aggregate;
pub mod checkpoint;
pub mod enumerate;
pub mod pool;

use crate::registry::{RegistryError, SiteRegistry};
use aggregate::Aggregator;
use checkpoint::CheckpointLog;
use pool::ExtractOptions;
use std::collections::HashSet;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::thread;

/// Everything one pipeline run needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub targets: HashSet<IpAddr>,
    pub site_map: Option<PathBuf>,
    pub instance_map: Option<PathBuf>,
    pub checkpoint: Option<PathBuf>,
    pub workers: usize,
    pub tshark_filter: bool,
    pub normalize_times: bool,
}

/// End-of-run counts for the operator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub enumerated: usize,
    pub recorded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn handled(&self) -> usize {
        self.recorded + self.failed + self.skipped
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("cannot open checkpoint log {}: {source}", .path.display())]
    Checkpoint { path: PathBuf, source: io::Error },
    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("directories {} and {} both claim output name {name}", .first.display(), .second.display())]
    OutputCollision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Runs the full pipeline: load durable state, enumerate, extract on the
/// pool, aggregate. The registry snapshot is persisted before returning,
/// whether the run completed or was cancelled.
pub fn run(config: RunConfig, cancel: &AtomicBool) -> Result<RunSummary, PipelineError> {
    let registry = SiteRegistry::load(config.site_map.as_deref(), config.instance_map.as_deref())?;
    log::info!("registry holds {} known sites", registry.site_count());

    let checkpoint = match config.checkpoint.as_deref() {
        Some(path) => Some(CheckpointLog::open(path).map_err(|e| PipelineError::Checkpoint {
            path: path.to_path_buf(),
            source: e,
        })?),
        None => None,
    };

    let tasks = enumerate::enumerate_captures(&config.inputs, checkpoint.as_ref())?;
    let total = tasks.len();

    let aggregator = Aggregator::new(
        config.output_dir.clone(),
        registry,
        checkpoint,
        config.site_map.clone(),
        config.instance_map.clone(),
    )?;

    let pool = pool::build_pool(config.workers)?;
    let options = ExtractOptions {
        targets: config.targets.clone(),
        normalize_times: config.normalize_times,
        tshark_filter: config.tshark_filter,
    };
    let (tx, rx) = crossbeam_channel::bounded(config.workers.max(1) * 2);

    thread::scope(|scope| {
        scope.spawn(|| pool::dispatch(&pool, tasks, &options, tx, cancel));
        aggregator.run(rx, cancel, total)
    })
}
