//! Error taxonomy for the snapshot pipeline.
//!
//! Per-line data problems (bad JSON, missing key) are handled where they
//! occur and never become errors. Everything that reaches this type is fatal
//! to the run: configuration mistakes, per-file I/O failures, external tool
//! failures, and violated stage postconditions. Each stage wraps its cause
//! with stage context before returning.

use std::path::PathBuf;

use sliceline_core::ToolError;

#[derive(Debug)]
pub enum SnapshotError {
    /// Invalid configuration, rejected before any stage runs
    Config(String),
    /// I/O failure on a specific file
    Io { path: PathBuf, source: std::io::Error },
    /// External sort/compress/extract tool failed
    Tool(ToolError),
    /// Stage 2 produced an empty result from a non-empty index
    EmptySortOutput { lines_file: PathBuf },
    /// A winners-file row that is not a `source \t line_number` pair
    MalformedWinnerRow { row: String },
    /// SIGINT/SIGTERM arrived; workers drained without finishing the corpus
    Interrupted,
    /// Stage context wrapper; the outermost error the caller sees
    Stage {
        stage: u8,
        source: Box<SnapshotError>,
    },
}

impl SnapshotError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with the stage it occurred in.
    pub fn in_stage(stage: u8, source: SnapshotError) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Tool(e) => write!(f, "{e}"),
            Self::EmptySortOutput { lines_file } => write!(
                f,
                "line numbers file {} is empty after sorting a non-empty index",
                lines_file.display()
            ),
            Self::MalformedWinnerRow { row } => {
                write!(f, "invalid line in winners file: {row:?}")
            }
            Self::Interrupted => write!(f, "interrupted by signal"),
            Self::Stage { stage, source } => write!(f, "error in stage {stage}: {source}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Tool(e) => Some(e),
            Self::Stage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ToolError> for SnapshotError {
    fn from(e: ToolError) -> Self {
        Self::Tool(e)
    }
}
