use std::fmt;
use std::path::PathBuf;

/// One observed packet: when it was seen and how large it was on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketObservation {
    /// Microseconds since the sequence origin (or since the epoch when
    /// normalization is off).
    pub time_us: i64,
    pub length: i32,    // We use i32 to allow for negative values, indicating inbound packets
}

impl PacketObservation {
    pub fn new(time_us: i64, length: i32) -> Self {
        Self { time_us, length }
    }
}

/// Renders as one sequence-file line: decimal seconds, a tab, the signed
/// length. Seconds keep at least one fractional digit and drop trailing
/// zeros, so 200_000 us prints as `0.2` and 0 us as `0.0`.
impl fmt::Display for PacketObservation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\t{}", format_seconds(self.time_us), self.length)
    }
}

/// Ordered per-capture observation list. Empty means "no matching traffic".
pub type Sequence = Vec<PacketObservation>;

/// Formats integer microseconds as exact decimal seconds.
pub fn format_seconds(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let secs = abs / 1_000_000;
    let frac = abs % 1_000_000;
    if frac == 0 {
        return format!("{sign}{secs}.0");
    }
    let digits = format!("{frac:06}");
    format!("{sign}{secs}.{}", digits.trim_end_matches('0'))
}

/// One enumerated input capture, identified by its containing directory and
/// file name. Immutable once enumerated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureTask {
    pub dir: PathBuf,
    pub file_name: String,
}

impl CaptureTask {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    /// Full path of the capture file.
    pub fn source_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Name of the containing directory, which doubles as the output file
    /// name and carries the site label.
    pub fn dir_name(&self) -> Option<&str> {
        self.dir.file_name().and_then(|name| name.to_str())
    }
}

/// Outcome of one worker invocation.
#[derive(Clone, Debug)]
pub enum CaptureResult {
    /// Extraction succeeded; ready for recording.
    Parsed {
        site: String,
        output_name: String,
        sequence: Sequence,
        source: PathBuf,
    },
    /// Extraction failed; details were logged at the worker.
    Failed { source: PathBuf },
    /// Containing directory does not follow the naming convention.
    Skipped { source: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn formats_whole_and_fractional_seconds() {
        assert_eq!(format_seconds(0), "0.0");
        assert_eq!(format_seconds(200_000), "0.2");
        assert_eq!(format_seconds(1), "0.000001");
        assert_eq!(format_seconds(3_000_000), "3.0");
        assert_eq!(format_seconds(1_234_560), "1.23456");
        assert_eq!(format_seconds(1_700_000_000_123_456), "1700000000.123456");
    }

    #[test]
    fn formats_negative_offsets() {
        assert_eq!(format_seconds(-200_000), "-0.2");
        assert_eq!(format_seconds(-1_000_000), "-1.0");
    }

    #[test]
    fn observation_renders_as_tab_delimited_line() {
        assert_eq!(PacketObservation::new(0, 60).to_string(), "0.0\t60");
        assert_eq!(PacketObservation::new(200_000, -1500).to_string(), "0.2\t-1500");
    }

    #[test]
    fn task_paths_derive_from_dir_and_file() {
        let task = CaptureTask::new("/data/b1_siteA_0", "trace.pcap");
        assert_eq!(task.source_path(), Path::new("/data/b1_siteA_0/trace.pcap"));
        assert_eq!(task.dir_name(), Some("b1_siteA_0"));
    }
}
