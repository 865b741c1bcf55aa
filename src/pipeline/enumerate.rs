//! Walks capture roots into the run's task list.
use super::checkpoint::CheckpointLog;
use super::PipelineError;
use crate::extract::containers::CaptureTask;
use std::collections::HashMap;
use std::path::PathBuf;
use walkdir::WalkDir;

/// File suffix a capture must carry to be considered.
pub const CAPTURE_SUFFIX: &str = "pcap";

/// Fields of the `batch_site_instance` directory naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteName<'a> {
    pub batch: &'a str,
    pub site: &'a str,
    pub instance: &'a str,
}

/// Splits a containing-directory name into its three fields. Anything but
/// exactly three is a naming violation.
pub fn parse_site_name(dir_name: &str) -> Option<SiteName<'_>> {
    let mut fields = dir_name.split('_');
    let (batch, site, instance) = (fields.next()?, fields.next()?, fields.next()?);
    if fields.next().is_some() {
        return None;
    }
    Some(SiteName {
        batch,
        site,
        instance,
    })
}

/// Enumerates every submittable capture under `roots`.
///
/// Non-conforming directory names are skipped silently, paths already in
/// the checkpoint log are excluded, and two distinct directories claiming
/// the same output name abort the run before any processing starts.
/// Enumeration order is not stable across runs and nothing downstream may
/// depend on it.
pub fn enumerate_captures(
    roots: &[PathBuf],
    checkpoint: Option<&CheckpointLog>,
) -> Result<Vec<CaptureTask>, PipelineError> {
    let mut tasks = Vec::new();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let mut resumed = 0usize;

    for root in roots {
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("cannot enumerate under {}: {e}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CAPTURE_SUFFIX) {
                continue;
            }
            let Some(dir) = path.parent() else { continue };
            let Some(dir_name) = dir.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if parse_site_name(dir_name).is_none() {
                log::debug!(
                    "skipping {}: directory does not follow batch_site_instance",
                    path.display()
                );
                continue;
            }
            match claimed.get(dir_name) {
                Some(owner) if owner != dir => {
                    return Err(PipelineError::OutputCollision {
                        name: dir_name.to_string(),
                        first: owner.clone(),
                        second: dir.to_path_buf(),
                    });
                }
                Some(_) => {}
                None => {
                    claimed.insert(dir_name.to_string(), dir.to_path_buf());
                }
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let task = CaptureTask::new(dir, file_name);
            if checkpoint.is_some_and(|log| log.contains(&task.source_path())) {
                resumed += 1;
                continue;
            }
            tasks.push(task);
        }
    }

    if resumed > 0 {
        log::info!("{resumed} captures already recorded, skipping");
    }
    log::info!("enumerated {} captures to process", tasks.len());
    Ok(tasks)
}
