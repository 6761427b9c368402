//! Stage 1 — minimal-info extraction.
//!
//! Workers stream each dump file line by line and write tab-separated
//! `source \t line_number \t timestamp \t key` tuples into a single
//! zstd-compressed index. Line numbers are 1-based against the original
//! file, so stage 3 can slice the winning lines back out later. The index is
//! an unordered bag; dedup correctness rests on the timestamp field alone.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::ProgressBar;
use sliceline_core::{
    ByteCounter, ExcludeSet, ProgressContext, WorkQueue, open_counted_reader, shutdown_flag,
};

use crate::error::SnapshotError;
use crate::record::Record;

/// Initial capacity for the per-line read buffer; oversized records grow it
/// as needed and the allocation is reused for the rest of the file.
const LINE_BUF_CAPACITY: usize = 4096;

/// Per-file cap on logged parse failures; the rest are only counted
const MAX_LOGGED_PARSE_ERRORS: u64 = 5;

/// Progress bar update interval, in lines
const UPDATE_INTERVAL: u64 = 10_000;

/// The single shared index output: a zstd stream behind one coarse mutex.
///
/// Workers flush whole batches through [`append`](IndexWriter::append), so
/// lock contention is amortized over `batch_size` records. Explicitly
/// constructed and injected rather than ambient, which keeps it swappable in
/// tests.
pub struct IndexWriter {
    encoder: Mutex<Option<zstd::Encoder<'static, BufWriter<File>>>>,
    path: PathBuf,
}

impl IndexWriter {
    /// Open a zstd-compressed index stream at `path`.
    pub fn create(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::create(path).map_err(|e| SnapshotError::io(path, e))?;
        let encoder = zstd::Encoder::new(BufWriter::new(file), 0)
            .map_err(|e| SnapshotError::io(path, e))?;
        Ok(Self {
            encoder: Mutex::new(Some(encoder)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one batch under the lock.
    fn append(&self, batch: &[u8]) -> Result<(), SnapshotError> {
        let mut guard = self.encoder.lock().expect("index writer poisoned");
        let encoder = guard.as_mut().expect("index writer already finished");
        encoder
            .write_all(batch)
            .map_err(|e| SnapshotError::io(&self.path, e))
    }

    /// Finish the zstd frame and flush the file. The stage 1 barrier: stage 2
    /// must not run before this returns.
    pub fn finish(self) -> Result<(), SnapshotError> {
        let encoder = self
            .encoder
            .into_inner()
            .expect("index writer poisoned")
            .expect("index writer already finished");
        let mut inner = encoder.finish().map_err(|e| SnapshotError::io(&self.path, e))?;
        inner.flush().map_err(|e| SnapshotError::io(&self.path, e))
    }
}

/// Counters accumulated across all stage 1 workers.
#[derive(Debug, Default, Clone)]
pub struct ExtractStats {
    pub files_processed: u64,
    pub lines_scanned: u64,
    pub entries_indexed: u64,
    pub parse_errors: u64,
    pub empty_keys: u64,
    pub excluded: u64,
}

impl ExtractStats {
    fn merge(&mut self, other: &ExtractStats) {
        self.files_processed += other.files_processed;
        self.lines_scanned += other.lines_scanned;
        self.entries_indexed += other.entries_indexed;
        self.parse_errors += other.parse_errors;
        self.empty_keys += other.empty_keys;
        self.excluded += other.excluded;
    }
}

/// Run stage 1: extract index tuples from every input file.
///
/// A fixed pool of workers pulls files off a closed queue; each worker owns
/// one file at a time. The first I/O error halts dispatch (in-flight files
/// finish) and is returned after the pool drains.
pub fn extract_minimal_info(
    input_files: &[PathBuf],
    excludes: &ExcludeSet,
    num_workers: usize,
    batch_size: usize,
    writer: &IndexWriter,
    progress: &ProgressContext,
) -> Result<ExtractStats, SnapshotError> {
    log::debug!("extracting minimal information with {num_workers} workers");
    let queue = WorkQueue::new(input_files.to_vec());
    let total_files = queue.total();
    let first_error: Mutex<Option<SnapshotError>> = Mutex::new(None);
    let stats: Mutex<ExtractStats> = Mutex::new(ExtractStats::default());
    let files_done = AtomicU64::new(0);

    rayon::scope(|s| {
        for _ in 0..num_workers {
            s.spawn(|_| {
                while let Some(path) = queue.next() {
                    if shutdown_flag().load(Ordering::Relaxed) {
                        queue.halt();
                        break;
                    }
                    let name = path.to_string_lossy();
                    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                    let pb = progress.file_bar(&name, size);
                    pb.set_message("scanning...");

                    match extract_file(path, excludes, batch_size, writer, &pb) {
                        Ok(file_stats) => {
                            pb.finish_and_clear();
                            stats
                                .lock()
                                .expect("worker thread panicked")
                                .merge(&file_stats);
                            let done = files_done.fetch_add(1, Ordering::Relaxed) + 1;
                            let pct = done as f64 / total_files as f64 * 100.0;
                            log::info!("done [{done}/{total_files}][{pct:.2}%]: {name}");
                        }
                        Err(e) => {
                            pb.finish_and_clear();
                            queue.halt();
                            let mut slot = first_error.lock().expect("worker thread panicked");
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            break;
                        }
                    }
                }
            });
        }
    });

    if let Some(e) = first_error.into_inner().expect("worker thread panicked") {
        return Err(e);
    }
    if shutdown_flag().load(Ordering::Relaxed) {
        return Err(SnapshotError::Interrupted);
    }
    Ok(stats.into_inner().expect("worker thread panicked"))
}

/// Stream one dump file and append its surviving tuples to the index.
fn extract_file(
    path: &Path,
    excludes: &ExcludeSet,
    batch_size: usize,
    writer: &IndexWriter,
    pb: &ProgressBar,
) -> Result<ExtractStats, SnapshotError> {
    let (mut reader, counter) =
        open_counted_reader(path).map_err(|e| SnapshotError::io(path, e))?;
    let source = path.to_string_lossy();

    let mut stats = ExtractStats::default();
    let mut batch = String::new();
    let mut batched_entries = 0usize;
    let mut buf = String::with_capacity(LINE_BUF_CAPACITY);
    let mut line_num: u64 = 0;

    loop {
        buf.clear();
        let n = reader
            .read_line(&mut buf)
            .map_err(|e| SnapshotError::io(path, e))?;
        if n == 0 {
            break;
        }
        // 1-based, counting every physical line, so numbers stay aligned
        // with what sed/awk/filterline see in the original file.
        line_num += 1;
        stats.lines_scanned += 1;

        if stats.lines_scanned % UPDATE_INTERVAL == 0 {
            pb.set_position(counter.load(Ordering::Relaxed));
        }

        let record: Record = match serde_json::from_str(buf.trim_end()) {
            Ok(r) => r,
            Err(e) => {
                stats.parse_errors += 1;
                if stats.parse_errors <= MAX_LOGGED_PARSE_ERRORS {
                    log::warn!("skipping invalid JSON at {source}:{line_num}: {e}");
                }
                continue;
            }
        };
        if record.doi.is_empty() {
            stats.empty_keys += 1;
            continue;
        }
        if !excludes.allows(&record.doi) {
            stats.excluded += 1;
            continue;
        }

        // Format: source \t lineNumber \t timestamp \t key
        batch.push_str(&format!(
            "{source}\t{line_num}\t{}\t{}\n",
            record.indexed.timestamp, record.doi
        ));
        stats.entries_indexed += 1;
        batched_entries += 1;
        if batched_entries >= batch_size {
            writer.append(batch.as_bytes())?;
            batch.clear();
            batched_entries = 0;
        }
    }

    if !batch.is_empty() {
        writer.append(batch.as_bytes())?;
    }
    pb.set_position(counter.load(Ordering::Relaxed));
    stats.files_processed = 1;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_index(path: &Path) -> String {
        let file = File::open(path).unwrap();
        let mut decoder = zstd::Decoder::new(file).unwrap();
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        out
    }

    fn record_line(doi: &str, ts: i64) -> String {
        format!(r#"{{"DOI":"{doi}","indexed":{{"timestamp":{ts}}},"title":["t"]}}"#)
    }

    #[test]
    fn index_entries_carry_original_line_numbers() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.json");
        let content = [
            record_line("10.1000/a", 100),
            "{broken".to_string(),
            record_line("10.1000/b", 200),
        ]
        .join("\n");
        std::fs::write(&input, content + "\n").unwrap();

        let index_path = dir.path().join("index.txt.zst");
        let writer = IndexWriter::create(&index_path).unwrap();
        let progress = ProgressContext::new();
        let stats = extract_minimal_info(
            &[input.clone()],
            &ExcludeSet::default(),
            2,
            10,
            &writer,
            &progress,
        )
        .unwrap();
        writer.finish().unwrap();

        assert_eq!(stats.lines_scanned, 3);
        assert_eq!(stats.entries_indexed, 2);
        assert_eq!(stats.parse_errors, 1);

        let index = read_index(&index_path);
        let source = input.to_string_lossy();
        // The broken middle line still occupies line number 2.
        assert!(index.contains(&format!("{source}\t1\t100\t10.1000/a\n")));
        assert!(index.contains(&format!("{source}\t3\t200\t10.1000/b\n")));
        assert_eq!(index.lines().count(), 2);
    }

    #[test]
    fn excluded_and_keyless_records_never_reach_the_index() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.json");
        let content = [
            record_line("10.1000/keep", 1),
            record_line("10.1000/drop", 2),
            r#"{"indexed":{"timestamp":3}}"#.to_string(),
        ]
        .join("\n");
        std::fs::write(&input, content + "\n").unwrap();

        let index_path = dir.path().join("index.txt.zst");
        let writer = IndexWriter::create(&index_path).unwrap();
        let progress = ProgressContext::new();
        let excludes = ExcludeSet::new(vec!["10.1000/drop".to_string()]);
        let stats =
            extract_minimal_info(&[input], &excludes, 1, 100, &writer, &progress).unwrap();
        writer.finish().unwrap();

        assert_eq!(stats.entries_indexed, 1);
        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.empty_keys, 1);

        let index = read_index(&index_path);
        assert!(index.contains("10.1000/keep"));
        assert!(!index.contains("10.1000/drop"));
    }

    #[test]
    fn small_batch_size_flushes_multiple_times() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.json");
        let lines: Vec<String> = (0..25)
            .map(|i| record_line(&format!("10.1000/x{i}"), i))
            .collect();
        std::fs::write(&input, lines.join("\n") + "\n").unwrap();

        let index_path = dir.path().join("index.txt.zst");
        let writer = IndexWriter::create(&index_path).unwrap();
        let progress = ProgressContext::new();
        let stats = extract_minimal_info(
            &[input],
            &ExcludeSet::default(),
            1,
            4, // force several locked flushes
            &writer,
            &progress,
        )
        .unwrap();
        writer.finish().unwrap();

        assert_eq!(stats.entries_indexed, 25);
        assert_eq!(read_index(&index_path).lines().count(), 25);
    }

    #[test]
    fn unopenable_file_fails_the_stage() {
        let dir = TempDir::new().unwrap();
        let index_path = dir.path().join("index.txt.zst");
        let writer = IndexWriter::create(&index_path).unwrap();
        let progress = ProgressContext::new();
        let missing = dir.path().join("missing.json");

        let err = extract_minimal_info(
            &[missing.clone()],
            &ExcludeSet::default(),
            2,
            10,
            &writer,
            &progress,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn many_files_across_workers_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let mut inputs = Vec::new();
        for f in 0..8 {
            let input = dir.path().join(format!("input{f}.json"));
            let lines: Vec<String> = (0..50)
                .map(|i| record_line(&format!("10.1000/f{f}-r{i}"), i))
                .collect();
            std::fs::write(&input, lines.join("\n") + "\n").unwrap();
            inputs.push(input);
        }

        let index_path = dir.path().join("index.txt.zst");
        let writer = IndexWriter::create(&index_path).unwrap();
        let progress = ProgressContext::new();
        let stats = extract_minimal_info(
            &inputs,
            &ExcludeSet::default(),
            4,
            7,
            &writer,
            &progress,
        )
        .unwrap();
        writer.finish().unwrap();

        assert_eq!(stats.files_processed, 8);
        assert_eq!(stats.entries_indexed, 8 * 50);
        assert_eq!(read_index(&index_path).lines().count(), 8 * 50);
    }
}
