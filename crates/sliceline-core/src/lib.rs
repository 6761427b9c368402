//! Sliceline Core - Common infrastructure for snapshot pipelines
//!
//! This crate provides reusable components for reading, scheduling, and
//! filtering line-delimited metadata dump files, plus the glue for shelling
//! out to the system sort and compression tools.

pub mod command;
pub mod compression;
pub mod filter;
pub mod logging;
pub mod progress;
pub mod queue;
pub mod schedule;
pub mod shutdown;

// Re-exports for convenience
pub use command::{ToolError, has_command, run_command, run_shell, shell_quote};
pub use compression::{ByteCounter, Compression, is_zstd_file, open_counted_reader, open_reader};
pub use filter::ExcludeSet;
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use queue::WorkQueue;
pub use schedule::{shuffle, sort_by_size_desc};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
