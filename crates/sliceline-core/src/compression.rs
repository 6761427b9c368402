//! Compression-aware input handling.
//!
//! Dump files arrive plain, gzip (`.gz`) or zstd (`.zst`) compressed. The
//! format is resolved once per file from the suffix and carried as a small
//! closed variant, never re-dispatched per read. Stages that shell out to the
//! system compressors build their command fragments from the same variant, so
//! in-process reads and external pipelines always agree on the format.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::MultiGzDecoder;

use crate::command::shell_quote;

/// Buffer size for decompressing readers (256KB)
const READER_BUF_SIZE: usize = 256 * 1024;

/// zstd frame magic: 28 B5 2F FD
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Compression format of a dump file, resolved once per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
    Zstd,
}

impl Compression {
    /// Detect format from the filename suffix. Unsuffixed files are plain.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Self::Gzip,
            Some("zst") => Self::Zstd,
            _ => Self::Plain,
        }
    }

    /// Shell fragment that streams the decompressed file to stdout.
    pub fn decompress_cmd(self, path: &Path) -> String {
        let quoted = shell_quote(&path.to_string_lossy());
        match self {
            Self::Plain => format!("cat {quoted}"),
            Self::Gzip => format!("gzip -cd {quoted}"),
            Self::Zstd => format!("zstd -cd -T0 {quoted}"),
        }
    }

    /// Shell fragment that compresses stdin to stdout, or `None` for plain.
    pub fn compress_cmd(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Gzip => Some("gzip -c9"),
            Self::Zstd => Some("zstd -c9 -T0"),
        }
    }
}

/// Open a dump file as a plain byte stream, decompressing according to its
/// suffix. The returned reader owns the file handle.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    match Compression::from_path(path) {
        Compression::Plain => Ok(Box::new(BufReader::with_capacity(READER_BUF_SIZE, file))),
        Compression::Gzip => Ok(Box::new(BufReader::with_capacity(
            READER_BUF_SIZE,
            MultiGzDecoder::new(file),
        ))),
        Compression::Zstd => {
            let decoder = zstd::Decoder::new(file)?;
            Ok(Box::new(BufReader::with_capacity(READER_BUF_SIZE, decoder)))
        }
    }
}

/// Shared counter of compressed bytes consumed, for progress tracking.
pub type ByteCounter = Arc<AtomicU64>;

/// Reader wrapper that tracks bytes read from the underlying file.
///
/// Sits below the decompressor, so the count measures progress through the
/// on-disk (compressed) file and can be compared against its stat size.
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Like [`open_reader`], but also returns a counter of compressed bytes read.
pub fn open_counted_reader(
    path: &Path,
) -> io::Result<(Box<dyn BufRead + Send>, ByteCounter)> {
    let counter: ByteCounter = Arc::new(AtomicU64::new(0));
    let file = CountingReader {
        inner: File::open(path)?,
        count: counter.clone(),
    };
    let reader: Box<dyn BufRead + Send> = match Compression::from_path(path) {
        Compression::Plain => Box::new(BufReader::with_capacity(READER_BUF_SIZE, file)),
        Compression::Gzip => Box::new(BufReader::with_capacity(
            READER_BUF_SIZE,
            MultiGzDecoder::new(file),
        )),
        Compression::Zstd => Box::new(BufReader::with_capacity(
            READER_BUF_SIZE,
            zstd::Decoder::new(file)?,
        )),
    };
    Ok((reader, counter))
}

/// Check the zstd frame magic, for files whose suffix is untrustworthy.
///
/// Supporting check only; suffix detection via [`Compression::from_path`]
/// is the primary dispatch.
pub fn is_zstd_file(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    let mut head = [0u8; 4];
    match file.read(&mut head) {
        Ok(n) if n == 4 => head == ZSTD_MAGIC,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn detect_by_suffix() {
        assert_eq!(
            Compression::from_path(Path::new("a/b/dump.json.gz")),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_path(Path::new("dump.json.zst")),
            Compression::Zstd
        );
        assert_eq!(
            Compression::from_path(Path::new("dump.json")),
            Compression::Plain
        );
        assert_eq!(Compression::from_path(Path::new("dump")), Compression::Plain);
    }

    #[test]
    fn decompress_cmd_quotes_path() {
        let cmd = Compression::Zstd.decompress_cmd(Path::new("/tmp/a b.zst"));
        assert_eq!(cmd, "zstd -cd -T0 '/tmp/a b.zst'");
    }

    #[test]
    fn compress_cmd_none_for_plain() {
        assert!(Compression::Plain.compress_cmd().is_none());
        assert_eq!(Compression::Gzip.compress_cmd(), Some("gzip -c9"));
    }

    #[test]
    fn open_reader_plain_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.json");
        std::fs::write(&path, "line1\nline2\n").unwrap();

        let mut reader = open_reader(&path).unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "line1\nline2\n");
    }

    #[test]
    fn open_reader_gzip_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.json.gz");
        let file = File::create(&path).unwrap();
        let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        enc.write_all(b"{\"a\":1}\n{\"a\":2}\n").unwrap();
        enc.finish().unwrap();

        let mut reader = open_reader(&path).unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn open_reader_zstd_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.json.zst");
        let file = File::create(&path).unwrap();
        let mut enc = zstd::Encoder::new(file, 0).unwrap();
        enc.write_all(b"{\"a\":1}\n").unwrap();
        enc.finish().unwrap();

        let mut reader = open_reader(&path).unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "{\"a\":1}\n");
    }

    #[test]
    fn is_zstd_file_checks_magic() {
        let dir = TempDir::new().unwrap();

        let zst = dir.path().join("x.bin");
        let file = File::create(&zst).unwrap();
        let mut enc = zstd::Encoder::new(file, 0).unwrap();
        enc.write_all(b"payload").unwrap();
        enc.finish().unwrap();
        assert!(is_zstd_file(&zst));

        let plain = dir.path().join("y.bin");
        std::fs::write(&plain, b"not compressed at all").unwrap();
        assert!(!is_zstd_file(&plain));

        assert!(!is_zstd_file(&dir.path().join("missing.bin")));
    }

    #[test]
    fn open_reader_missing_file_errors() {
        assert!(open_reader(Path::new("/nonexistent/nope.json")).is_err());
    }
}
