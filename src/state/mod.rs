//! State module for harvested records
//!
//! # Components
//!
//! - `Record`: one output entry per unit, either a `DetailRecord` or a `FailedRecord`
//! - `ListRow` / `CategoryRow`: rows of the two table-shaped crawls
//! - `ResultAccumulator`: the append-only collection persisted after every batch

mod accumulator;
mod record;

// Re-export main types
pub use accumulator::ResultAccumulator;
pub use record::{
    CategoryRow, DetailRecord, FailedRecord, FailureReason, ListRow, Record, MISSING_IMAGE_URL,
    MISSING_RECIPE, MISSING_TEXT, MISSING_UNIT_AMOUNTS,
};
