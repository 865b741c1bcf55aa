use anyhow::Context;
use capseq::pipeline::{self, RunConfig};
use capseq::ui::output;
use clap::{ArgAction, Parser};
use simple_logger::SimpleLogger;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// capseq turns per-site packet captures into traffic fingerprint sequences
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root directory containing capture folders; repeatable
    #[arg(short = 'i', long = "input", required = true, value_parser)]
    inputs: Vec<PathBuf>,

    /// Directory to write sequence files to
    #[arg(short = 'o', long, value_parser)]
    output: PathBuf,

    /// Target IP address, v4 or v6; repeatable
    #[arg(short = 'a', long = "address", required = true, value_parser)]
    addresses: Vec<IpAddr>,

    /// Site map JSON file, loaded at startup and rewritten at shutdown
    #[arg(short = 's', long, value_parser)]
    sites: Option<PathBuf>,

    /// Instance count JSON file, loaded at startup and rewritten at shutdown
    #[arg(short = 'n', long, value_parser)]
    instances: Option<PathBuf>,

    /// Checkpoint log; captures already listed there are skipped
    #[arg(short = 'c', long, value_parser)]
    checkpoint: Option<PathBuf>,

    /// Number of worker threads, default is the available cores
    #[arg(short = 'w', long, value_parser)]
    workers: Option<usize>,

    /// Pre-filter captures through tshark before extraction
    #[arg(short = 'f', long, action = ArgAction::SetTrue)]
    filter: bool,

    /// Record absolute timestamps instead of origin-relative ones
    #[arg(long, action = ArgAction::SetTrue)]
    raw_times: bool,
}

fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let args = Args::parse();

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("cannot install interrupt handler")?;

    let workers = match args.workers {
        Some(n) if n > 0 => n,
        Some(_) => anyhow::bail!("--workers must be at least 1"),
        None => thread::available_parallelism().map(usize::from).unwrap_or(1),
    };

    let config = RunConfig {
        inputs: args.inputs,
        output_dir: args.output,
        targets: args.addresses.into_iter().collect::<HashSet<IpAddr>>(),
        site_map: args.sites,
        instance_map: args.instances,
        checkpoint: args.checkpoint,
        workers,
        tshark_filter: args.filter,
        normalize_times: !args.raw_times,
    };

    log::info!(
        "processing {} input root(s) with {workers} workers",
        config.inputs.len()
    );

    let summary = pipeline::run(config, &cancel).context("pipeline failed")?;
    output::print_summary(&summary);

    Ok(())
}
