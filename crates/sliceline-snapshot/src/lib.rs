//! Sliceline Snapshot - three-stage deduplicating snapshot pipeline
//!
//! A continuously harvested collection of dump files accumulates many
//! versions of the same record (same key, different reharvest timestamps).
//! This crate consolidates such a corpus into one snapshot file with exactly
//! one record per key — the one with the newest timestamp:
//!
//! 1. extract `(source, line, timestamp, key)` tuples into a compressed index
//! 2. external-sort the index and keep the newest entry per key
//! 3. slice exactly the winning lines back out of the original files
//!
//! The corpus may be far larger than memory; stage 2 delegates to the system
//! `sort`, and stage 3 re-reads only winning lines, so peak memory stays
//! bounded by worker count, not corpus size.

pub mod config;
pub mod error;
pub mod index;
pub mod latest;
pub mod record;
pub mod slice;
pub mod snapshot;
pub mod stats;

pub use config::SnapshotConfig;
pub use error::SnapshotError;
pub use index::ExtractStats;
pub use snapshot::create_snapshot;
pub use stats::SnapshotSummary;
