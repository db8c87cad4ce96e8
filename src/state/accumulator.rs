//! Append-only result accumulator
//!
//! Holds every record produced so far, in batch-completion order, together
//! with the success/failure tally. Only the orchestrator's completion loop
//! mutates it.

use crate::state::Record;
use std::collections::HashSet;

/// Ordered, append-only collection of records
#[derive(Debug, Clone, Default)]
pub struct ResultAccumulator {
    records: Vec<Record>,
    succeeded: usize,
}

impl ResultAccumulator {
    /// Creates an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an accumulator with records carried over from a previous run
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut accumulator = Self::new();
        accumulator.merge(records);
        accumulator
    }

    /// Appends one batch worth of records
    pub fn merge(&mut self, records: Vec<Record>) {
        self.succeeded += records.iter().filter(|r| r.is_success()).count();
        self.records.extend(records);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.succeeded
    }

    pub fn failure_count(&self) -> usize {
        self.records.len() - self.succeeded
    }

    /// IDs of all units already represented
    pub fn unit_ids(&self) -> HashSet<u64> {
        self.records.iter().map(Record::id).collect()
    }

    /// Looks up the record for a unit
    pub fn get(&self, id: u64) -> Option<&Record> {
        self.records.iter().find(|r| r.id() == id)
    }
}
