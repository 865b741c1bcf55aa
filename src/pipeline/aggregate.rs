//! Single-writer consumption of extraction results.
//!
//! All durable state funnels through one `Aggregator`, one result at a
//! time, so registry updates, output files, and checkpoint appends never
//! race no matter how wide the pool is.
use super::checkpoint::CheckpointLog;
use super::{PipelineError, RunSummary};
use crate::extract::containers::{CaptureResult, Sequence};
use crate::registry::SiteRegistry;
use crate::ui::output;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often the receive loop rechecks the cancellation flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long draining already-delivered results may take after cancellation.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Owns the registry, the checkpoint log, and the output directory for one
/// run.
#[derive(Debug)]
pub struct Aggregator {
    output_dir: PathBuf,
    registry: SiteRegistry,
    checkpoint: Option<CheckpointLog>,
    site_map: Option<PathBuf>,
    instance_map: Option<PathBuf>,
    summary: RunSummary,
}

impl Aggregator {
    pub fn new(
        output_dir: PathBuf,
        registry: SiteRegistry,
        checkpoint: Option<CheckpointLog>,
        site_map: Option<PathBuf>,
        instance_map: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        fs::create_dir_all(&output_dir).map_err(|e| PipelineError::OutputDir {
            path: output_dir.clone(),
            source: e,
        })?;
        Ok(Self {
            output_dir,
            registry,
            checkpoint,
            site_map,
            instance_map,
            summary: RunSummary::default(),
        })
    }

    /// Consumes results until the pool disconnects or cancellation is
    /// observed, then persists the registry. Persistence runs on every exit
    /// path, interrupted or not.
    pub fn run(
        mut self,
        results: Receiver<CaptureResult>,
        cancel: &AtomicBool,
        total: usize,
    ) -> Result<RunSummary, PipelineError> {
        self.summary.enumerated = total;
        loop {
            if cancel.load(Ordering::SeqCst) {
                log::info!("interrupt received, draining delivered results");
                self.summary.interrupted = true;
                self.drain(&results);
                break;
            }
            match results.recv_timeout(POLL_INTERVAL) {
                Ok(result) => self.record(result),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.finish()
    }

    /// Receives whatever the workers already produced, bounded by the
    /// grace deadline; anything later is abandoned.
    fn drain(&mut self, results: &Receiver<CaptureResult>) {
        let deadline = Instant::now() + DRAIN_GRACE;
        while let Ok(result) = results.recv_deadline(deadline) {
            self.record(result);
        }
    }

    fn record(&mut self, result: CaptureResult) {
        match result {
            CaptureResult::Parsed {
                site,
                output_name,
                sequence,
                source,
            } => self.record_parsed(site, output_name, sequence, source),
            CaptureResult::Failed { source } => {
                log::debug!("not recording failed capture {}", source.display());
                self.summary.failed += 1;
            }
            CaptureResult::Skipped { .. } => self.summary.skipped += 1,
        }
        output::print_progress(self.summary.handled(), self.summary.enumerated);
    }

    fn record_parsed(&mut self, site: String, output_name: String, sequence: Sequence, source: PathBuf) {
        if site.is_empty() {
            log::warn!("empty site label for {}, not recording", source.display());
            self.summary.skipped += 1;
            return;
        }

        let id = self.registry.id_for(&site);

        let out_path = self.output_dir.join(&output_name);
        if let Err(e) = output::save_sequence(&sequence, &out_path) {
            log::error!("cannot write {}: {e}", out_path.display());
            self.summary.failed += 1;
            return;
        }

        // Checkpoint strictly after the output exists on disk. A failed
        // append leaves the capture unclaimed and the next run records it
        // again, so its instance must not be counted yet.
        if let Some(checkpoint) = self.checkpoint.as_mut() {
            if let Err(e) = checkpoint.append(&source) {
                log::error!("cannot checkpoint {}: {e}", source.display());
                self.summary.failed += 1;
                return;
            }
        }

        self.registry.record_instance(id);
        self.summary.recorded += 1;
        log::debug!(
            "recorded {} as {output_name} ({} observations)",
            source.display(),
            sequence.len()
        );
    }

    fn finish(self) -> Result<RunSummary, PipelineError> {
        self.registry
            .save(self.site_map.as_deref(), self.instance_map.as_deref())?;
        Ok(self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::containers::PacketObservation;
    use crossbeam_channel::bounded;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::tempdir;

    fn parsed(site: &str, output_name: &str, source: &str) -> CaptureResult {
        CaptureResult::Parsed {
            site: site.to_string(),
            output_name: output_name.to_string(),
            sequence: vec![PacketObservation::new(0, 60)],
            source: PathBuf::from(source),
        }
    }

    fn aggregator(dir: &Path, with_state: bool) -> Aggregator {
        let checkpoint = with_state
            .then(|| CheckpointLog::open(&dir.join("done.log")).unwrap());
        Aggregator::new(
            dir.join("out"),
            SiteRegistry::new(),
            checkpoint,
            with_state.then(|| dir.join("sites.json")),
            with_state.then(|| dir.join("instances.json")),
        )
        .unwrap()
    }

    fn site_map(dir: &Path) -> HashMap<String, u32> {
        serde_json::from_str(&fs::read_to_string(dir.join("sites.json")).unwrap()).unwrap()
    }

    fn instance_map(dir: &Path) -> HashMap<u32, u32> {
        serde_json::from_str(&fs::read_to_string(dir.join("instances.json")).unwrap()).unwrap()
    }

    #[test]
    fn delivery_order_drives_id_assignment() {
        let dir = tempdir().unwrap();
        let (tx, rx) = bounded(16);
        tx.send(parsed("siteA", "b1_siteA_0", "/in/b1_siteA_0/trace.pcap")).unwrap();
        tx.send(parsed("siteB", "b1_siteB_1", "/in/b1_siteB_1/trace.pcap")).unwrap();
        drop(tx);

        let summary = aggregator(dir.path(), true)
            .run(rx, &AtomicBool::new(false), 2)
            .unwrap();

        assert_eq!(summary.recorded, 2);
        assert!(!summary.interrupted);
        let sites = site_map(dir.path());
        assert_eq!(sites.get("siteA"), Some(&0));
        assert_eq!(sites.get("siteB"), Some(&1));
        let instances = instance_map(dir.path());
        assert_eq!(instances.get(&0), Some(&1));
        assert_eq!(instances.get(&1), Some(&1));
        assert!(dir.path().join("out/b1_siteA_0").exists());
        assert!(dir.path().join("out/b1_siteB_1").exists());
    }

    #[test]
    fn interrupt_drains_delivered_results_and_persists() {
        let dir = tempdir().unwrap();
        let (tx, rx) = bounded(16);
        for i in 0..3 {
            tx.send(parsed(
                &format!("site{i}"),
                &format!("b1_site{i}_0"),
                &format!("/in/b1_site{i}_0/trace.pcap"),
            ))
            .unwrap();
        }
        drop(tx);

        let cancel = AtomicBool::new(true);
        let summary = aggregator(dir.path(), true).run(rx, &cancel, 10).unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.recorded, 3);
        assert_eq!(summary.enumerated, 10);
        assert_eq!(site_map(dir.path()).len(), 3);
        assert_eq!(instance_map(dir.path()).len(), 3);
        let checkpoint_lines = fs::read_to_string(dir.path().join("done.log")).unwrap();
        assert_eq!(checkpoint_lines.lines().count(), 3);
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 3);
    }

    #[test]
    fn failed_and_empty_label_results_touch_nothing() {
        let dir = tempdir().unwrap();
        let (tx, rx) = bounded(16);
        tx.send(CaptureResult::Failed {
            source: PathBuf::from("/in/b1_siteA_0/trace.pcap"),
        })
        .unwrap();
        tx.send(parsed("", "b1__0", "/in/b1__0/trace.pcap")).unwrap();
        tx.send(CaptureResult::Skipped {
            source: PathBuf::from("/in/junk/trace.pcap"),
        })
        .unwrap();
        drop(tx);

        let summary = aggregator(dir.path(), true)
            .run(rx, &AtomicBool::new(false), 3)
            .unwrap();

        assert_eq!(summary.recorded, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert!(site_map(dir.path()).is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("done.log")).unwrap(), "");
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
    }

    #[test]
    fn repeated_sites_count_instances_once_per_capture() {
        let dir = tempdir().unwrap();
        let (tx, rx) = bounded(16);
        tx.send(parsed("siteA", "b1_siteA_0", "/in/b1_siteA_0/trace.pcap")).unwrap();
        tx.send(parsed("siteA", "b2_siteA_1", "/in/b2_siteA_1/trace.pcap")).unwrap();
        drop(tx);

        aggregator(dir.path(), true)
            .run(rx, &AtomicBool::new(false), 2)
            .unwrap();

        assert_eq!(site_map(dir.path()).len(), 1);
        assert_eq!(instance_map(dir.path()).get(&0), Some(&2));
    }

    #[test]
    fn no_checkpoint_line_without_an_output_file() {
        let dir = tempdir().unwrap();
        let (tx, rx) = bounded(16);
        // An empty output name resolves to the output directory itself,
        // which cannot be created as a file.
        tx.send(parsed("siteA", "", "/in/b1_siteA_0/trace.pcap")).unwrap();
        drop(tx);

        let summary = aggregator(dir.path(), true)
            .run(rx, &AtomicBool::new(false), 1)
            .unwrap();

        assert_eq!(summary.recorded, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(fs::read_to_string(dir.path().join("done.log")).unwrap(), "");
    }

    #[test]
    fn registry_not_persisted_when_no_paths_configured() {
        let dir = tempdir().unwrap();
        let (tx, rx) = bounded(16);
        tx.send(parsed("siteA", "b1_siteA_0", "/in/b1_siteA_0/trace.pcap")).unwrap();
        drop(tx);

        let summary = aggregator(dir.path(), false)
            .run(rx, &AtomicBool::new(false), 1)
            .unwrap();

        assert_eq!(summary.recorded, 1);
        assert!(!dir.path().join("sites.json").exists());
    }
}
