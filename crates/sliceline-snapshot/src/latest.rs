//! Stage 2 — latest version identification.
//!
//! The index from stage 1 is piped through the system `sort`, which handles
//! datasets far larger than RAM by spilling compressed runs to disk. Two
//! passes: the first orders rows by key and recency, the second deduplicates
//! on the key keeping the first (most recent) row. What survives is cut down
//! to `source \t line_number` pairs, one winner per key.

use std::io::BufRead;
use std::path::Path;

use sliceline_core::{Compression, is_zstd_file, open_reader, run_shell, shell_quote};

use crate::error::SnapshotError;

/// Build the full stage 2 shell pipeline.
///
/// Sort keys, in order: key ascending, timestamp descending numeric, then
/// source and line number as tie breakers so equal-timestamp duplicates
/// resolve the same way on every run. `LC_ALL=C` pins byte-order collation,
/// and `--compress-program=zstd` keeps spilled runs small.
fn sort_pipeline(index_file: &Path, lines_file: &Path, buffer: &str, parallel: usize) -> String {
    let produce = if is_zstd_file(index_file) {
        Compression::Zstd.decompress_cmd(index_file)
    } else {
        Compression::Plain.decompress_cmd(index_file)
    };
    let sort = format!(
        "LC_ALL=C sort -t$'\\t' --compress-program=zstd --parallel {parallel} -S{buffer}"
    );
    let out = shell_quote(&lines_file.to_string_lossy());
    format!(
        "{produce} | {sort} -k4,4 -k3,3nr -k1,1 -k2,2n | {sort} -k4,4 -u | cut -f1,2 > {out}"
    )
}

/// Run stage 2: reduce the index to one winning line per key.
///
/// Writes `source \t line_number` rows to `lines_file` and returns the
/// number of winners. An empty result from a non-empty index means the sort
/// pipeline broke somewhere and is treated as fatal.
pub fn identify_latest_versions(
    index_file: &Path,
    lines_file: &Path,
    sort_buffer_size: &str,
    parallel: usize,
) -> Result<u64, SnapshotError> {
    let pipeline = sort_pipeline(index_file, lines_file, sort_buffer_size, parallel);
    log::debug!("sorting index: {pipeline}");
    run_shell(&pipeline)?;

    let winners = count_lines(lines_file)?;
    if winners == 0 && !index_is_empty(index_file)? {
        return Err(SnapshotError::EmptySortOutput {
            lines_file: lines_file.to_path_buf(),
        });
    }
    log::debug!("identified {winners} latest record versions");
    Ok(winners)
}

fn count_lines(path: &Path) -> Result<u64, SnapshotError> {
    let reader = open_reader(path).map_err(|e| SnapshotError::io(path, e))?;
    let mut n = 0u64;
    for line in reader.lines() {
        line.map_err(|e| SnapshotError::io(path, e))?;
        n += 1;
    }
    Ok(n)
}

/// Check whether the (possibly compressed) index holds any bytes at all.
fn index_is_empty(path: &Path) -> Result<bool, SnapshotError> {
    let mut reader = open_reader(path).map_err(|e| SnapshotError::io(path, e))?;
    let buf = reader.fill_buf().map_err(|e| SnapshotError::io(path, e))?;
    Ok(buf.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Write;
    use tempfile::TempDir;

    fn row(source: &str, line: u64, ts: i64, key: &str) -> String {
        format!("{source}\t{line}\t{ts}\t{key}\n")
    }

    fn winners_of(lines_file: &Path) -> BTreeSet<(String, u64)> {
        std::fs::read_to_string(lines_file)
            .unwrap()
            .lines()
            .map(|l| {
                let (source, num) = l.split_once('\t').unwrap();
                (source.to_string(), num.parse().unwrap())
            })
            .collect()
    }

    #[test]
    fn most_recent_row_wins_per_key() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.txt");
        let mut rows = String::new();
        rows += &row("file1", 10, 300, "10.1000/a");
        rows += &row("file2", 5, 200, "10.1000/a");
        rows += &row("file1", 11, 100, "10.1000/b");
        rows += &row("file2", 30, 400, "10.1000/b");
        rows += &row("file3", 15, 50, "10.1000/c");
        rows += &row("file3", 16, 40, "10.1000/c");
        rows += &row("file2", 7, 10, "10.1000/c");
        std::fs::write(&index, rows).unwrap();

        let lines = dir.path().join("lines.txt");
        let n = identify_latest_versions(&index, &lines, "10%", 1).unwrap();
        assert_eq!(n, 3);
        let expected: BTreeSet<(String, u64)> = [
            ("file1".to_string(), 10),
            ("file2".to_string(), 30),
            ("file3".to_string(), 15),
        ]
        .into_iter()
        .collect();
        assert_eq!(winners_of(&lines), expected);
    }

    #[test]
    fn winner_pointers_across_three_files() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.txt");
        let mut rows = String::new();
        rows += &row("file1", 0, 1610000000, "10.1000/test1");
        rows += &row("file2", 5, 1620000000, "10.1000/test1");
        rows += &row("file1", 10, 1630000000, "10.1000/test2");
        rows += &row("file3", 15, 1640000000, "10.1000/test3");
        rows += &row("file2", 20, 1630000000, "10.1000/test3");
        rows += &row("file1", 25, 1650000000, "10.1000/test4");
        rows += &row("file2", 30, 1660000000, "10.1000/test4");
        std::fs::write(&index, rows).unwrap();

        let lines = dir.path().join("lines.txt");
        let n = identify_latest_versions(&index, &lines, "10%", 2).unwrap();
        assert_eq!(n, 4);
        let expected: BTreeSet<(String, u64)> = [
            ("file2".to_string(), 5),
            ("file1".to_string(), 10),
            ("file3".to_string(), 15),
            ("file2".to_string(), 30),
        ]
        .into_iter()
        .collect();
        assert_eq!(winners_of(&lines), expected);
    }

    #[test]
    fn timestamp_ties_resolve_deterministically() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.txt");
        // Same key, same timestamp: lowest source then lowest line wins.
        let mut rows = String::new();
        rows += &row("fileB", 3, 100, "10.1000/t");
        rows += &row("fileA", 9, 100, "10.1000/t");
        rows += &row("fileA", 2, 100, "10.1000/t");
        std::fs::write(&index, rows).unwrap();

        let lines = dir.path().join("lines.txt");
        let n = identify_latest_versions(&index, &lines, "10%", 1).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            winners_of(&lines),
            [("fileA".to_string(), 2)].into_iter().collect()
        );
    }

    #[test]
    fn negative_and_large_timestamps_compare_numerically() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.txt");
        let mut rows = String::new();
        rows += &row("f", 1, -5, "10.1000/n");
        rows += &row("f", 2, 0, "10.1000/n");
        rows += &row("f", 3, 9, "10.1000/n");
        rows += &row("f", 4, 10, "10.1000/n"); // lexically before "9"
        std::fs::write(&index, rows).unwrap();

        let lines = dir.path().join("lines.txt");
        identify_latest_versions(&index, &lines, "10%", 1).unwrap();
        assert_eq!(
            winners_of(&lines),
            [("f".to_string(), 4)].into_iter().collect()
        );
    }

    #[test]
    fn empty_index_yields_empty_winners_without_error() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.txt");
        std::fs::write(&index, "").unwrap();

        let lines = dir.path().join("lines.txt");
        let n = identify_latest_versions(&index, &lines, "10%", 1).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn compressed_index_is_decompressed_in_the_pipeline() {
        if !sliceline_core::has_command("zstd") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.txt.zst");
        let file = std::fs::File::create(&index).unwrap();
        let mut enc = zstd::Encoder::new(file, 0).unwrap();
        enc.write_all(row("f", 1, 100, "10.1000/z").as_bytes())
            .unwrap();
        enc.write_all(row("f", 2, 200, "10.1000/z").as_bytes())
            .unwrap();
        enc.finish().unwrap();

        let lines = dir.path().join("lines.txt");
        let n = identify_latest_versions(&index, &lines, "10%", 1).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            winners_of(&lines),
            [("f".to_string(), 2)].into_iter().collect()
        );
    }
}
