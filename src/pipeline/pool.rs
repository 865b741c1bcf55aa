//! Concurrent capture extraction.
//!
//! Workers are pure: they read a capture, build a result, and send it over
//! the channel. Everything durable happens on the aggregator side.
use super::enumerate::parse_site_name;
use super::PipelineError;
use crate::extract::containers::{CaptureResult, CaptureTask, Sequence};
use crate::extract::{filter, pcap, ExtractError};
use crossbeam_channel::Sender;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-worker extraction settings, shared read-only across the pool.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub targets: HashSet<IpAddr>,
    pub normalize_times: bool,
    pub tshark_filter: bool,
}

/// Builds the fixed-size worker pool.
pub fn build_pool(workers: usize) -> Result<rayon::ThreadPool, PipelineError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("extract-{i}"))
        .build()
        .map_err(PipelineError::from)
}

/// Runs every task on the pool, sending each result as it completes.
///
/// Completion order is unspecified. A set cancellation flag makes the
/// remaining tasks return without extracting, and send failures after the
/// consumer has gone away abandon the result.
pub fn dispatch(
    pool: &rayon::ThreadPool,
    tasks: Vec<CaptureTask>,
    options: &ExtractOptions,
    results: Sender<CaptureResult>,
    cancel: &AtomicBool,
) {
    pool.install(|| {
        tasks.into_par_iter().for_each_with(results, |results, task| {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            let _ = results.send(run_task(&task, options));
        });
    });
}

/// Processes one capture end to end: derive the site from the directory
/// name, optionally pre-filter, then extract the sequence.
fn run_task(task: &CaptureTask, options: &ExtractOptions) -> CaptureResult {
    let source = task.source_path();
    let Some(dir_name) = task.dir_name() else {
        return CaptureResult::Skipped { source };
    };
    let Some(name) = parse_site_name(dir_name) else {
        return CaptureResult::Skipped { source };
    };

    match extract(&source, options) {
        Ok(sequence) => CaptureResult::Parsed {
            site: name.site.to_string(),
            output_name: dir_name.to_string(),
            sequence,
            source,
        },
        Err(e) => {
            log::error!("failed to process {}: {e}", source.display());
            CaptureResult::Failed { source }
        }
    }
}

fn extract(source: &Path, options: &ExtractOptions) -> Result<Sequence, ExtractError> {
    if !options.tshark_filter {
        return pcap::extract_sequence(source, &options.targets, options.normalize_times);
    }
    let filtered = filter::filter_capture(source, &options.targets)?;
    let result = pcap::extract_sequence(&filtered, &options.targets, options.normalize_times);
    if let Err(e) = fs::remove_file(&filtered) {
        log::warn!("cannot remove filtered capture {}: {e}", filtered.display());
    }
    result
}
