//! Input file scheduling.
//!
//! Ordering is a throughput heuristic, never a correctness concern: dedup
//! depends only on record timestamps. The default policy processes the
//! largest files first so the worker pool stays busy toward the end of a
//! run; shuffling spreads load differently across repeated runs.

use std::path::PathBuf;

/// Order files by size, largest first.
///
/// Files that cannot be stat'd are dropped from the processing set with a
/// warning; scheduling is best-effort and does not fail the run. A file that
/// passes the stat but fails to open later is still a fatal stage error.
pub fn sort_by_size_desc(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut sized: Vec<(PathBuf, u64)> = Vec::with_capacity(files.len());
    for file in files {
        match std::fs::metadata(&file) {
            Ok(meta) => sized.push((file, meta.len())),
            Err(e) => log::warn!("skipping input {}: {e}", file.display()),
        }
    }
    sized.sort_by(|a, b| b.1.cmp(&a.1));
    sized.into_iter().map(|(f, _)| f).collect()
}

/// Randomize processing order.
pub fn shuffle(files: &mut [PathBuf]) {
    fastrand::shuffle(files);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_sized(dir: &TempDir, name: &str, bytes: usize) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![b'x'; bytes]).unwrap();
        path
    }

    #[test]
    fn largest_first() {
        let dir = TempDir::new().unwrap();
        let small = write_sized(&dir, "small.json", 10);
        let big = write_sized(&dir, "big.json", 1000);
        let mid = write_sized(&dir, "mid.json", 100);

        let ordered = sort_by_size_desc(vec![small.clone(), big.clone(), mid.clone()]);
        assert_eq!(ordered, vec![big, mid, small]);
    }

    #[test]
    fn missing_files_dropped() {
        let dir = TempDir::new().unwrap();
        let present = write_sized(&dir, "present.json", 5);
        let missing = dir.path().join("missing.json");

        let ordered = sort_by_size_desc(vec![missing, present.clone()]);
        assert_eq!(ordered, vec![present]);
    }

    #[test]
    fn shuffle_preserves_membership() {
        let mut files: Vec<PathBuf> = (0..50).map(|i| PathBuf::from(format!("f{i}"))).collect();
        let original = files.clone();
        shuffle(&mut files);
        let mut sorted = files.clone();
        sorted.sort();
        let mut expected = original;
        expected.sort();
        assert_eq!(sorted, expected);
    }
}
