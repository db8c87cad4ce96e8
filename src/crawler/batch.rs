//! Work partitioning
//!
//! A unit range is cut into consecutive fixed-size batches, numbered from 1 in
//! range order. The last batch may be shorter; no unit is skipped or repeated.

use std::fmt;

/// An inclusive range of work units (page numbers or entity IDs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRange {
    pub start: u64,
    pub end: u64,
}

impl UnitRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of units, zero for a reversed range
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, unit: u64) -> bool {
        unit >= self.start && unit <= self.end
    }

    pub fn units(&self) -> impl Iterator<Item = u64> {
        self.start..=self.end
    }
}

impl fmt::Display for UnitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

/// A contiguous slice of units handled by one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position in range order
    pub number: u32,

    /// Units in processing order
    pub units: Vec<u64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Splits a unit range into batches of `batch_size`
///
/// # Arguments
///
/// * `range` - The inclusive unit range
/// * `batch_size` - Units per batch; must be at least 1
///
/// # Returns
///
/// `ceil(len / batch_size)` batches covering every unit exactly once
pub fn partition(range: UnitRange, batch_size: usize) -> Vec<Batch> {
    partition_units(range.units(), batch_size)
}

/// Splits an ordered unit sequence into batches of `batch_size`
///
/// Used when part of a range is already done and only the remaining units
/// are scheduled.
pub fn partition_units(units: impl IntoIterator<Item = u64>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size);

    for unit in units {
        current.push(unit);
        if current.len() == batch_size {
            batches.push(Batch {
                number: batches.len() as u32 + 1,
                units: std::mem::replace(&mut current, Vec::with_capacity(batch_size)),
            });
        }
    }

    if !current.is_empty() {
        batches.push(Batch {
            number: batches.len() as u32 + 1,
            units: current,
        });
    }

    batches
}
