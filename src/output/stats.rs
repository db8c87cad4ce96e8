//! Run statistics
//!
//! This module collects the counts and timings of one harvest run and prints
//! them to stdout at the end of the run.

use crate::config::CrawlMode;
use crate::state::Record;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Summary of one harvest run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: CrawlMode,

    /// Inclusive unit range, absent for the category crawl
    pub range: Option<(u64, u64)>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,

    /// Units (pages or IDs) the run was asked to cover
    pub units_total: u64,
    pub units_succeeded: u64,
    pub units_failed: u64,

    /// Successful records carried over from a previous run
    pub units_resumed: u64,

    /// Rows written to CSV, for the table crawls
    pub rows_written: Option<u64>,

    /// Failure message -> number of units
    pub failure_reasons: BTreeMap<String, u64>,

    /// Files produced by the run
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    /// Starts a summary timestamped now
    pub fn start(mode: CrawlMode, config_hash: impl Into<String>) -> Self {
        Self {
            mode,
            range: None,
            started_at: Utc::now(),
            finished_at: None,
            config_hash: config_hash.into(),
            units_total: 0,
            units_succeeded: 0,
            units_failed: 0,
            units_resumed: 0,
            rows_written: None,
            failure_reasons: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    /// Stamps the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }

    /// Counts `count` failed units under `reason`
    pub fn record_failure(&mut self, reason: impl Into<String>, count: u64) {
        if count == 0 {
            return;
        }
        self.units_failed += count;
        *self.failure_reasons.entry(reason.into()).or_insert(0) += count;
    }

    /// Tallies success and failure over a final record set
    pub fn tally_records(&mut self, records: &[Record]) {
        for record in records {
            match record.error() {
                Some(error) => self.record_failure(error, 1),
                None => self.units_succeeded += 1,
            }
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.units_total == 0 {
            0.0
        } else {
            (self.units_succeeded as f64 / self.units_total as f64) * 100.0
        }
    }
}

/// Prints a summary to stdout in a formatted manner
pub fn print_summary(summary: &RunSummary) {
    println!("\n=== Harvest Summary ({}) ===\n", summary.mode);

    if let Some((start, end)) = summary.range {
        println!("  Range: {}-{}", start, end);
    }
    println!("  Units: {}", summary.units_total);
    println!(
        "  Succeeded: {} ({:.1}%)",
        summary.units_succeeded,
        summary.success_rate()
    );
    println!("  Failed: {}", summary.units_failed);
    if summary.units_resumed > 0 {
        println!("  Carried over from previous run: {}", summary.units_resumed);
    }
    if let Some(rows) = summary.rows_written {
        println!("  Rows written: {}", rows);
    }
    if let Some(seconds) = summary.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!();

    if !summary.failure_reasons.is_empty() {
        println!("Failures:");
        let mut reasons: Vec<_> = summary.failure_reasons.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1));
        for (reason, count) in reasons {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if !summary.outputs.is_empty() {
        println!("Output:");
        for path in &summary.outputs {
            println!("  - {}", path.display());
        }
    }
}
