//! Pipeline orchestration.
//!
//! Runs the three stages in order with hard barriers between them: the index
//! is finished before sorting starts, and the winners file is complete before
//! any source is re-read. Temp files live in the configured temp dir and are
//! removed at the end of the run, successful or not, unless the caller asks
//! to keep them for debugging.

use std::path::{Path, PathBuf};
use std::time::Instant;

use sliceline_core::{ExcludeSet, ProgressContext, fmt_num, shuffle, sort_by_size_desc};

use crate::config::{SnapshotConfig, TEMPFILE_PREFIX};
use crate::error::SnapshotError;
use crate::index::{IndexWriter, extract_minimal_info};
use crate::latest::identify_latest_versions;
use crate::slice::extract_relevant_records;
use crate::stats::SnapshotSummary;

/// Run the full snapshot pipeline.
///
/// On success the snapshot at `config.output_file` holds exactly one record
/// per distinct key, and the returned summary accounts for every scanned
/// line. On error the partially written output is left in place but the
/// intermediate files are still cleaned up.
pub fn create_snapshot(
    config: &SnapshotConfig,
    progress: &ProgressContext,
) -> Result<SnapshotSummary, SnapshotError> {
    config.validate()?;
    log::info!(
        "creating snapshot from {} files into {}",
        config.input_files.len(),
        config.output_file.display()
    );

    let index_file = create_temp_file(&config.temp_dir, "index", ".txt.zst")?;
    let lines_file = create_temp_file(&config.temp_dir, "lines", ".txt")?;
    log::debug!("index file: {}", index_file.display());
    log::debug!("line numbers file: {}", lines_file.display());

    let result = run_stages(config, &index_file, &lines_file, progress);

    for temp in [&index_file, &lines_file] {
        if config.keep_temp_files {
            log::info!("keeping temp file: {}", temp.display());
        } else if let Err(e) = std::fs::remove_file(temp) {
            log::warn!("failed to remove {}: {e}", temp.display());
        }
    }
    result
}

fn run_stages(
    config: &SnapshotConfig,
    index_file: &Path,
    lines_file: &Path,
    progress: &ProgressContext,
) -> Result<SnapshotSummary, SnapshotError> {
    // Stage 1: the queue order only affects load balancing; largest-first
    // keeps the stragglers at the front, shuffling evens out hot storage.
    let mut files = config.input_files.clone();
    if config.shuffle_input_files {
        shuffle(&mut files);
    } else {
        files = sort_by_size_desc(files);
    }
    let excludes = ExcludeSet::new(config.excludes.iter().cloned());
    if !excludes.is_empty() {
        log::info!("excluding {} keys", fmt_num(excludes.len() as u64));
    }

    let started = Instant::now();
    let writer = IndexWriter::create(index_file).map_err(|e| SnapshotError::in_stage(1, e))?;
    let extract = extract_minimal_info(
        &files,
        &excludes,
        config.num_workers,
        config.batch_size,
        &writer,
        progress,
    )
    .map_err(|e| SnapshotError::in_stage(1, e))?;
    writer.finish().map_err(|e| SnapshotError::in_stage(1, e))?;
    let stage1_elapsed = started.elapsed();
    log::info!(
        "stage 1 completed in {:.1}s: {} entries indexed",
        stage1_elapsed.as_secs_f64(),
        fmt_num(extract.entries_indexed)
    );

    let started = Instant::now();
    let bar = progress.stage_line("sort");
    bar.set_message("sorting index...");
    let latest_versions = identify_latest_versions(
        index_file,
        lines_file,
        &config.sort_buffer_size,
        config.num_workers,
    )
    .map_err(|e| SnapshotError::in_stage(2, e))?;
    bar.finish_and_clear();
    let stage2_elapsed = started.elapsed();
    log::info!(
        "stage 2 completed in {:.1}s: {} latest versions",
        stage2_elapsed.as_secs_f64(),
        fmt_num(latest_versions)
    );

    let started = Instant::now();
    let records_written = extract_relevant_records(config, lines_file, progress)
        .map_err(|e| SnapshotError::in_stage(3, e))?;
    let stage3_elapsed = started.elapsed();
    log::info!("stage 3 completed in {:.1}s", stage3_elapsed.as_secs_f64());

    Ok(SnapshotSummary {
        extract,
        latest_versions,
        records_written,
        stage1_elapsed,
        stage2_elapsed,
        stage3_elapsed,
    })
}

fn create_temp_file(temp_dir: &Path, kind: &str, suffix: &str) -> Result<PathBuf, SnapshotError> {
    let file = tempfile::Builder::new()
        .prefix(&format!("{TEMPFILE_PREFIX}-{kind}-"))
        .suffix(suffix)
        .tempfile_in(temp_dir)
        .map_err(|e| SnapshotError::io(temp_dir, e))?;
    let (_, path) = file
        .keep()
        .map_err(|e| SnapshotError::io(temp_dir, e.error))?;
    Ok(path)
}
