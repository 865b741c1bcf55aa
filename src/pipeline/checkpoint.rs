//! Append-only record of fully processed capture paths.
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// One source path per line. A listed path has its output file already on
/// disk, so the next run's enumeration skips it. The log is the sole
/// authority for "already processed".
#[derive(Debug)]
pub struct CheckpointLog {
    path: PathBuf,
    file: File,
    recorded: HashSet<String>,
}

impl CheckpointLog {
    /// Opens the log, creating it if needed, and loads previously recorded
    /// paths.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let recorded = match fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            recorded,
        })
    }

    pub fn contains(&self, source: &Path) -> bool {
        self.recorded.contains(&source.display().to_string())
    }

    /// Appends one processed path and forces it to disk before returning.
    pub fn append(&mut self, source: &Path) -> io::Result<()> {
        let line = source.display().to_string();
        writeln!(self.file, "{line}")?;
        self.file.sync_data()?;
        self.recorded.insert(line);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
