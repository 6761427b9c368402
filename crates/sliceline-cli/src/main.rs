//! sliceline - deduplicating snapshots of harvested metadata dumps
//!
//! Reduces a corpus of line-delimited JSON dump files, accumulated by
//! continuous harvesting, to a single snapshot holding only the most recent
//! version of each record.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;

use sliceline_core::{ProgressContext, shutdown_flag};
use sliceline_snapshot::{SnapshotConfig, SnapshotError, create_snapshot};

#[derive(Parser)]
#[command(name = "sliceline")]
#[command(about = "Deduplicating snapshots of harvested metadata dumps")]
#[command(version)]
struct Cli {
    /// Input dump files (line-delimited JSON; .gz and .zst are decompressed)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output snapshot file; compression follows the extension
    /// (default: dated file in the temp dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Records buffered per worker before flushing to the index
    #[arg(short = 'n', long, default_value_t = sliceline_snapshot::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Worker threads for the extraction stage (default: all cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Memory buffer per sort process, e.g. 25% or 1G
    #[arg(short = 'S', long, default_value = sliceline_snapshot::config::DEFAULT_SORT_BUFFER_SIZE)]
    sort_buffer_size: String,

    /// File of keys to exclude, one per line
    #[arg(short = 'X', long)]
    excludes_file: Option<PathBuf>,

    /// Directory for temporary files (default: system temp dir)
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Keep temporary files for inspection
    #[arg(short, long)]
    keep_temp_files: bool,

    /// Process input files in random order instead of largest-first
    #[arg(short = 'R', long)]
    shuffle: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let progress = Arc::new(ProgressContext::new());
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    sliceline_core::init_logging(cli.debug, multi);
    setup_signal_handler();

    // Blank lines and whitespace are cleaned up when the ExcludeSet is built.
    let excludes: Vec<String> = match &cli.excludes_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading excludes file {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let defaults = SnapshotConfig::default();
    let config = SnapshotConfig {
        input_files: cli.inputs,
        output_file: cli.output.unwrap_or(defaults.output_file),
        temp_dir: cli.temp_dir.unwrap_or(defaults.temp_dir),
        batch_size: cli.batch_size,
        num_workers: cli.workers.unwrap_or(defaults.num_workers),
        sort_buffer_size: cli.sort_buffer_size,
        keep_temp_files: cli.keep_temp_files,
        excludes,
        shuffle_input_files: cli.shuffle,
    };

    match create_snapshot(&config, &progress) {
        Ok(summary) => {
            if progress.is_tty() {
                eprintln!("{}", summary.format_table());
            } else {
                summary.log();
            }
            log::info!("snapshot written to {}", config.output_file.display());
            Ok(())
        }
        Err(e) if interrupted(&e) => {
            log::warn!("run interrupted, snapshot is incomplete");
            std::process::exit(130);
        }
        Err(e) => Err(e).context("snapshot failed"),
    }
}

fn interrupted(e: &SnapshotError) -> bool {
    match e {
        SnapshotError::Interrupted => true,
        SnapshotError::Stage { source, .. } => interrupted(source),
        _ => false,
    }
}

fn setup_signal_handler() {
    // First signal: set graceful shutdown flag
    // Second signal: force exit
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGTERM handler");
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGINT handler");
    }
}
