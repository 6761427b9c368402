//! Snapshot pipeline configuration.

use std::path::PathBuf;

use crate::error::SnapshotError;

/// Prefix for every temp file the pipeline creates
pub const TEMPFILE_PREFIX: &str = "sliceline-snapshot";

/// Default records per in-memory batch before flushing to the index
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Default sort memory buffer. Kept at 25% because stage 2 runs two sort
/// processes against the same budget; values above 50% can overcommit RAM.
pub const DEFAULT_SORT_BUFFER_SIZE: &str = "25%";

/// Runtime configuration for a snapshot run.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Input dump files (plain, .gz or .zst line-delimited JSON)
    pub input_files: Vec<PathBuf>,
    /// Final snapshot path; compression follows its extension
    pub output_file: PathBuf,
    /// Directory for temporary index/line-number files
    pub temp_dir: PathBuf,
    /// Records buffered per worker before a locked flush to the index
    pub batch_size: usize,
    /// Worker threads for stage 1
    pub num_workers: usize,
    /// `sort -S` value, e.g. "25%"
    pub sort_buffer_size: String,
    /// Keep temp files after the run (debugging)
    pub keep_temp_files: bool,
    /// Keys to drop unconditionally
    pub excludes: Vec<String>,
    /// Randomize processing order instead of largest-first
    pub shuffle_input_files: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir();
        let output_file = default_output_file(&temp_dir);
        Self {
            input_files: Vec::new(),
            output_file,
            temp_dir,
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: num_cpus(),
            sort_buffer_size: DEFAULT_SORT_BUFFER_SIZE.to_string(),
            keep_temp_files: false,
            excludes: Vec::new(),
            shuffle_input_files: false,
        }
    }
}

impl SnapshotConfig {
    /// Fail-fast validation, run before any stage.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.input_files.is_empty() {
            return Err(SnapshotError::Config("no input files provided".into()));
        }
        if self.batch_size == 0 {
            return Err(SnapshotError::Config("batch size must be positive".into()));
        }
        if self.num_workers == 0 {
            return Err(SnapshotError::Config("worker count must be positive".into()));
        }
        validate_sort_buffer_size(&self.sort_buffer_size)?;
        if let Some(parent) = self.output_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(SnapshotError::Config(format!(
                    "output directory does not exist: {}",
                    parent.display()
                )));
            }
        }
        if !self.temp_dir.is_dir() {
            return Err(SnapshotError::Config(format!(
                "temp directory does not exist: {}",
                self.temp_dir.display()
            )));
        }
        Ok(())
    }
}

/// Dated default output path under the temp dir, zstd-compressed.
pub fn default_output_file(temp_dir: &std::path::Path) -> PathBuf {
    let today = chrono::Local::now().format("%Y-%m-%d");
    temp_dir.join(format!("{TEMPFILE_PREFIX}-{today}.json.zst"))
}

pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Accept `sort -S` style sizes. Percentages are capped at 50% because two
/// sort invocations may run concurrently against the same memory budget.
fn validate_sort_buffer_size(value: &str) -> Result<(), SnapshotError> {
    if value.is_empty() {
        return Err(SnapshotError::Config("sort buffer size is empty".into()));
    }
    if let Some(percent) = value.strip_suffix('%') {
        let n: u32 = percent.parse().map_err(|_| {
            SnapshotError::Config(format!("invalid sort buffer size: {value:?}"))
        })?;
        if n == 0 || n > 50 {
            return Err(SnapshotError::Config(format!(
                "sort buffer percentage must be in 1..=50, got {n}%"
            )));
        }
    }
    // Non-percentage forms (e.g. "1G") are passed through to sort as-is.
    Ok(())
}
