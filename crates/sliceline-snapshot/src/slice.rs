//! Stage 3 — record extraction.
//!
//! The winners file from stage 2 is regrouped per source file into sorted
//! line-number lists, then each source is streamed once and the listed lines
//! are appended to the snapshot. Extraction uses `filterline` when installed
//! and an equivalent awk one-liner otherwise; both require the list and the
//! stream to be in ascending line order.

use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::Ordering;

use rustc_hash::FxHashMap;
use sliceline_core::{
    Compression, ProgressContext, fmt_num, has_command, open_reader, run_command, run_shell,
    shell_quote, shutdown_flag,
};

use crate::config::{SnapshotConfig, TEMPFILE_PREFIX};
use crate::error::SnapshotError;

/// Line-by-line filter equivalent to `filterline`: reads ascending line
/// numbers from the file in `$1` and prints the matching lines of stdin.
const FILTERLINE_FALLBACK: &str = r#"#!/bin/bash
LIST="$1" LC_ALL=C awk '
  function nextline() {
    if ((getline n < list) <= 0) exit
  }
  BEGIN {
    list = ENVIRON["LIST"]
    nextline()
  }
  NR == n {
    print
    nextline()
  }' < "$2"
"#;

/// Line numbers destined for one source file.
struct SourceLines {
    list_file: PathBuf,
    count: u64,
}

/// Run stage 3: append every winning line to the snapshot, source by source.
///
/// Sources are visited in `input_files` order, so the snapshot layout is
/// reproducible for a fixed input list. Returns the total number of records
/// written. Intermediate list files are removed afterwards whether or not
/// extraction succeeded, unless `keep_temp_files` is set.
pub fn extract_relevant_records(
    config: &SnapshotConfig,
    lines_file: &Path,
    progress: &ProgressContext,
) -> Result<u64, SnapshotError> {
    let mut groups = FxHashMap::default();
    let result = group_line_numbers(lines_file, &config.temp_dir, &mut groups)
        .and_then(|_| extract_all(config, &groups, progress));

    if config.keep_temp_files {
        for lines in groups.values() {
            log::info!("keeping line number list: {}", lines.list_file.display());
        }
    } else {
        for lines in groups.values() {
            if let Err(e) = std::fs::remove_file(&lines.list_file) {
                log::warn!("failed to remove {}: {e}", lines.list_file.display());
            }
        }
    }
    result
}

fn extract_all(
    config: &SnapshotConfig,
    groups: &FxHashMap<String, SourceLines>,
    progress: &ProgressContext,
) -> Result<u64, SnapshotError> {
    sort_line_number_lists(groups, &config.sort_buffer_size, config.num_workers)?;

    // Truncate up front so reruns never append onto a stale snapshot.
    File::create(&config.output_file)
        .map_err(|e| SnapshotError::io(&config.output_file, e))?;

    let filterline = FilterProgram::select(&config.temp_dir)?;
    let output_compression = Compression::from_path(&config.output_file);

    let bar = progress.stage_line("extract");
    let mut total = 0u64;
    for source in &config.input_files {
        if shutdown_flag().load(Ordering::Relaxed) {
            filterline.cleanup(config.keep_temp_files);
            return Err(SnapshotError::Interrupted);
        }
        let key = source.to_string_lossy();
        let Some(lines) = groups.get(key.as_ref()) else {
            log::debug!("no records to extract from {key}");
            continue;
        };
        bar.set_message(key.into_owned());
        let pipeline = extract_pipeline(
            filterline.command(),
            &lines.list_file,
            source,
            &config.output_file,
            output_compression,
        );
        log::debug!("extracting: {pipeline}");
        if let Err(e) = run_shell(&pipeline) {
            filterline.cleanup(config.keep_temp_files);
            return Err(e.into());
        }
        total += lines.count;
        log::info!(
            "extracted {} records from {}",
            fmt_num(lines.count),
            source.display()
        );
    }
    bar.finish_and_clear();
    filterline.cleanup(config.keep_temp_files);

    log::info!("total records extracted: {}", fmt_num(total));
    Ok(total)
}

struct OpenList {
    list_file: PathBuf,
    writer: BufWriter<File>,
    count: u64,
}

/// Split the winners file into one line-number list per source file.
///
/// Blank lines and `#` comments are tolerated; anything else that is not a
/// `source \t line_number` pair is fatal. List files are created lazily on
/// the first row for a source. Lists created before a failure still land in
/// `groups`, so the caller's cleanup covers them.
fn group_line_numbers(
    lines_file: &Path,
    temp_dir: &Path,
    groups: &mut FxHashMap<String, SourceLines>,
) -> Result<(), SnapshotError> {
    let mut open: FxHashMap<String, OpenList> = FxHashMap::default();
    let result = group_into(lines_file, temp_dir, &mut open);

    let mut flush_err = None;
    for (source, mut list) in open {
        if let Err(e) = list.writer.flush() {
            flush_err.get_or_insert(SnapshotError::io(&list.list_file, e));
        }
        groups.insert(
            source,
            SourceLines {
                list_file: list.list_file,
                count: list.count,
            },
        );
    }
    result.and(match flush_err {
        Some(e) => Err(e),
        None => Ok(()),
    })
}

fn group_into(
    lines_file: &Path,
    temp_dir: &Path,
    open: &mut FxHashMap<String, OpenList>,
) -> Result<(), SnapshotError> {
    let reader = open_reader(lines_file).map_err(|e| SnapshotError::io(lines_file, e))?;

    for line in reader.lines() {
        let line = line.map_err(|e| SnapshotError::io(lines_file, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((source, number)) = line.split_once('\t') else {
            return Err(SnapshotError::MalformedWinnerRow { row: line });
        };
        if number.parse::<u64>().is_err() {
            return Err(SnapshotError::MalformedWinnerRow { row: line });
        }

        if !open.contains_key(source) {
            let list_file = create_list_file(temp_dir, source)?;
            log::debug!("line number list for {source}: {}", list_file.display());
            let file =
                File::create(&list_file).map_err(|e| SnapshotError::io(&list_file, e))?;
            open.insert(
                source.to_string(),
                OpenList {
                    list_file,
                    writer: BufWriter::new(file),
                    count: 0,
                },
            );
        }
        let entry = open.get_mut(source).expect("list entry just inserted");
        writeln!(entry.writer, "{number}")
            .map_err(|e| SnapshotError::io(&entry.list_file, e))?;
        entry.count += 1;
    }
    Ok(())
}

/// Sort each list numerically in place; the extraction filters require
/// ascending order.
fn sort_line_number_lists(
    groups: &FxHashMap<String, SourceLines>,
    sort_buffer_size: &str,
    parallel: usize,
) -> Result<(), SnapshotError> {
    for lines in groups.values() {
        let mut cmd = Command::new("sort");
        cmd.env("LC_ALL", "C")
            .arg("-n")
            .arg(format!("-S{sort_buffer_size}"))
            .arg("--parallel")
            .arg(parallel.to_string())
            .arg("-o")
            .arg(&lines.list_file)
            .arg(&lines.list_file);
        run_command(&mut cmd)?;
    }
    Ok(())
}

/// One extraction pipeline: filter the source through the line list, then
/// recompress according to the snapshot's own extension and append.
fn extract_pipeline(
    filterline: &str,
    list_file: &Path,
    source: &Path,
    output_file: &Path,
    output_compression: Compression,
) -> String {
    let list = shell_quote(&list_file.to_string_lossy());
    let src = shell_quote(&source.to_string_lossy());
    let filter = match Compression::from_path(source) {
        Compression::Plain => format!("{filterline} {list} {src}"),
        compressed => {
            // Process substitution keeps the filter reading a plain stream.
            format!("{filterline} {list} <({})", compressed.decompress_cmd(source))
        }
    };
    let out = shell_quote(&output_file.to_string_lossy());
    match output_compression.compress_cmd() {
        Some(compress) => format!("{filter} | {compress} >> {out}"),
        None => format!("{filter} >> {out}"),
    }
}

/// The extraction filter: `filterline` from `PATH`, or a generated awk
/// fallback script in the temp dir.
struct FilterProgram {
    command: String,
    fallback_script: Option<PathBuf>,
}

impl FilterProgram {
    fn select(temp_dir: &Path) -> Result<Self, SnapshotError> {
        if has_command("filterline") {
            log::debug!("using installed filterline");
            return Ok(Self {
                command: "filterline".to_string(),
                fallback_script: None,
            });
        }
        let script = write_fallback_script(temp_dir)?;
        log::debug!("filterline not found, using fallback {}", script.display());
        Ok(Self {
            command: shell_quote(&script.to_string_lossy()),
            fallback_script: Some(script),
        })
    }

    fn command(&self) -> &str {
        &self.command
    }

    fn cleanup(&self, keep_temp_files: bool) {
        if let Some(script) = &self.fallback_script {
            if keep_temp_files {
                log::info!("keeping fallback script: {}", script.display());
            } else if let Err(e) = std::fs::remove_file(script) {
                log::warn!("failed to remove {}: {e}", script.display());
            }
        }
    }
}

fn write_fallback_script(temp_dir: &Path) -> Result<PathBuf, SnapshotError> {
    let file = tempfile::Builder::new()
        .prefix(&format!("{TEMPFILE_PREFIX}-filterline-"))
        .suffix(".sh")
        .tempfile_in(temp_dir)
        .map_err(|e| SnapshotError::io(temp_dir, e))?;
    let (mut handle, path) = file
        .keep()
        .map_err(|e| SnapshotError::io(temp_dir, e.error))?;
    handle
        .write_all(FILTERLINE_FALLBACK.as_bytes())
        .map_err(|e| SnapshotError::io(&path, e))?;
    handle
        .flush()
        .map_err(|e| SnapshotError::io(&path, e))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| SnapshotError::io(&path, e))?;
    Ok(path)
}

/// List file named after its source, with dots flattened so the source's
/// compression suffix never leaks into the temp file name.
fn create_list_file(temp_dir: &Path, source: &str) -> Result<PathBuf, SnapshotError> {
    let base = Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().replace('.', "-"))
        .unwrap_or_else(|| "unnamed".to_string());
    let file = tempfile::Builder::new()
        .prefix(&format!("{TEMPFILE_PREFIX}-{base}-"))
        .suffix(".txt")
        .tempfile_in(temp_dir)
        .map_err(|e| SnapshotError::io(temp_dir, e))?;
    let (_, path) = file
        .keep()
        .map_err(|e| SnapshotError::io(temp_dir, e.error))?;
    Ok(path)
}
