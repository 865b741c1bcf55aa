//! Durable site and instance bookkeeping.
//!
//! Two snapshots live on disk: the site map (label -> id) and the instance
//! map (id -> recorded capture count). Both are loaded once at startup and
//! rewritten at shutdown; between those points only the aggregator touches
//! the registry.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot read registry snapshot {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid registry snapshot {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write registry snapshot {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Label->id and id->count mappings for the whole corpus.
///
/// Ids are assigned in first-observed order, continuing from the largest id
/// found in the loaded snapshot, so labels keep their ids across runs and
/// new labels never collide with old ones.
#[derive(Debug, Default)]
pub struct SiteRegistry {
    site_to_id: HashMap<String, u32>,
    instance_counts: HashMap<u32, u32>,
    next_id: u32,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads both snapshots. A missing file yields an empty mapping; an
    /// unreadable or unparsable one is a configuration error, never
    /// silently repaired.
    pub fn load(site_map: Option<&Path>, instance_map: Option<&Path>) -> Result<Self, RegistryError> {
        let site_to_id: HashMap<String, u32> = match site_map {
            Some(path) => load_map(path)?,
            None => HashMap::new(),
        };
        let instance_counts: HashMap<u32, u32> = match instance_map {
            Some(path) => load_map(path)?,
            None => HashMap::new(),
        };
        let next_id = site_to_id.values().max().map_or(0, |max| max + 1);
        Ok(Self {
            site_to_id,
            instance_counts,
            next_id,
        })
    }

    /// Returns the id for `site`, assigning the next free one on first
    /// sight and starting its instance count at zero.
    pub fn id_for(&mut self, site: &str) -> u32 {
        if let Some(&id) = self.site_to_id.get(site) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.site_to_id.insert(site.to_string(), id);
        self.instance_counts.insert(id, 0);
        log::info!("new site {site} assigned id {id}");
        id
    }

    /// Counts one recorded capture for `id`.
    pub fn record_instance(&mut self, id: u32) {
        *self.instance_counts.entry(id).or_insert(0) += 1;
    }

    pub fn id_of(&self, site: &str) -> Option<u32> {
        self.site_to_id.get(site).copied()
    }

    pub fn instance_count(&self, id: u32) -> u32 {
        self.instance_counts.get(&id).copied().unwrap_or(0)
    }

    pub fn site_count(&self) -> usize {
        self.site_to_id.len()
    }

    /// Writes the snapshots for whichever paths are configured, replacing
    /// any prior ones.
    pub fn save(&self, site_map: Option<&Path>, instance_map: Option<&Path>) -> Result<(), RegistryError> {
        if let Some(path) = site_map {
            save_map(path, &self.site_to_id)?;
        }
        if let Some(path) = instance_map {
            save_map(path, &self.instance_counts)?;
        }
        Ok(())
    }
}

fn load_map<T>(path: &Path) -> Result<T, RegistryError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(RegistryError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_str(&raw).map_err(|e| RegistryError::Invalid {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Serializes to a sibling temp file, then renames over the target, so a
/// crash mid-write leaves the previous snapshot intact.
fn save_map<T: Serialize>(path: &Path, map: &T) -> Result<(), RegistryError> {
    let json = serde_json::to_string_pretty(map).map_err(|e| RegistryError::Invalid {
        path: path.to_path_buf(),
        source: e,
    })?;
    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = tmp_path(path);
        fs::write(&tmp, json.as_bytes())?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| RegistryError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
