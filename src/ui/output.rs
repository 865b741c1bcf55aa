use crate::extract::containers::PacketObservation;
use crate::pipeline::RunSummary;
use ansi_term::Colour;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes one observation per line, tab-delimited, and fsyncs so the
/// checkpoint log can rely on the file existing afterwards. An empty
/// sequence produces an empty file.
pub fn save_sequence(sequence: &[PacketObservation], path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for observation in sequence {
        writeln!(writer, "{observation}")?;
    }
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(())
}

/// Rewrites the in-place progress line.
pub fn print_progress(done: usize, total: usize) {
    print!("\rProcessed {done}/{total}");
    let _ = io::stdout().flush();
}

pub fn print_summary(summary: &RunSummary) {
    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Results");
    println!("\u{2503} Enumerated : {}", summary.enumerated);
    println!("\u{2503} Recorded   : {}", Colour::Green.paint(summary.recorded.to_string()));
    println!("\u{2503} Failed     : {}", Colour::Red.paint(summary.failed.to_string()));
    println!("\u{2503} Skipped    : {}", Colour::Fixed(226).paint(summary.skipped.to_string()));
    if summary.interrupted {
        println!("\u{2503} {}", Colour::Red.paint("Interrupted; partial run recorded"));
    }
}
