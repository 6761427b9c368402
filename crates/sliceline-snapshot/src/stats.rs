//! Run summary reporting.
//!
//! One summary per snapshot run, assembled by the orchestrator from the
//! stage results. TTY sessions get a rendered table, non-TTY sessions a
//! single log line.

use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use sliceline_core::fmt_num;

use crate::index::ExtractStats;

/// Everything a finished run reports.
#[derive(Debug, Default)]
pub struct SnapshotSummary {
    pub extract: ExtractStats,
    /// Distinct keys surviving deduplication
    pub latest_versions: u64,
    /// Records written to the snapshot; equals `latest_versions` on success
    pub records_written: u64,
    pub stage1_elapsed: Duration,
    pub stage2_elapsed: Duration,
    pub stage3_elapsed: Duration,
}

impl SnapshotSummary {
    pub fn total_elapsed(&self) -> Duration {
        self.stage1_elapsed + self.stage2_elapsed + self.stage3_elapsed
    }

    /// Share of scanned lines that survived into the snapshot.
    fn survival_pct(&self) -> f64 {
        pct(self.records_written, self.extract.lines_scanned)
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let e = &self.extract;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Snapshot")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Input files"),
            Cell::new(fmt_num(e.files_processed)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Lines scanned"),
            Cell::new(fmt_num(e.lines_scanned)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Parse errors"),
            Cell::new(fmt_num(e.parse_errors)),
            Cell::new(format!("{:.3}", pct(e.parse_errors, e.lines_scanned))),
        ]);
        table.add_row(vec![
            Cell::new("Missing keys"),
            Cell::new(fmt_num(e.empty_keys)),
            Cell::new(format!("{:.3}", pct(e.empty_keys, e.lines_scanned))),
        ]);
        table.add_row(vec![
            Cell::new("Excluded"),
            Cell::new(fmt_num(e.excluded)),
            Cell::new(format!("{:.3}", pct(e.excluded, e.lines_scanned))),
        ]);
        table.add_row(vec![
            Cell::new("Indexed"),
            Cell::new(fmt_num(e.entries_indexed)),
            Cell::new(format!("{:.1}", pct(e.entries_indexed, e.lines_scanned))),
        ]);
        table.add_row(vec![
            Cell::new("Snapshot records").fg(Color::Green),
            Cell::new(fmt_num(self.records_written)).fg(Color::Green),
            Cell::new(format!("{:.1}", self.survival_pct())).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!(
                "{:.1}s (extract {:.1}s, sort {:.1}s, slice {:.1}s)",
                self.total_elapsed().as_secs_f64(),
                self.stage1_elapsed.as_secs_f64(),
                self.stage2_elapsed.as_secs_f64(),
                self.stage3_elapsed.as_secs_f64()
            )),
            Cell::new(""),
        ]);

        format!("\n{table}")
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "snapshot complete: {} records from {} lines ({:.1}%) in {:.1}s",
            fmt_num(self.records_written),
            fmt_num(self.extract.lines_scanned),
            self.survival_pct(),
            self.total_elapsed().as_secs_f64()
        );
    }
}

/// Calculate percentage safely.
fn pct(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
