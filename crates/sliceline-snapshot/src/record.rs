//! Minimal record model for the stage 1 partial parse.
//!
//! Dump lines carry full bibliographic records, but stage 1 only needs the
//! key and the reharvest timestamp. Parsing just those two fields keeps the
//! hot loop cheap; everything else on the line is ignored and re-emitted
//! verbatim by stage 3.

use serde::Deserialize;

/// The two fields stage 1 extracts from each JSON line.
#[derive(Debug, Default, Deserialize)]
pub struct Record {
    /// Deduplication key. Missing or empty means the line is dropped.
    #[serde(rename = "DOI", default)]
    pub doi: String,
    #[serde(default)]
    pub indexed: Indexed,
}

/// Reharvest metadata; only the timestamp matters for version selection.
#[derive(Debug, Default, Deserialize)]
pub struct Indexed {
    /// Unix timestamp of the harvest that produced this version
    #[serde(default)]
    pub timestamp: i64,
}
