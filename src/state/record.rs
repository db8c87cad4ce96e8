//! Output record definitions
//!
//! Absent fields carry explicit sentinel strings instead of nulls so the JSON
//! and CSV writers never have to special-case missing data. Field order in the
//! structs is the serialized key order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for a text field that could not be read
pub const MISSING_TEXT: &str = "unavailable";

/// Sentinel for a detail page without a usable image reference
pub const MISSING_IMAGE_URL: &str = "no image url";

/// Sentinel for a dish page with neither ingredient list nor steps
pub const MISSING_RECIPE: &str = "no recipe";

/// Sentinel for a unit selector that could not be expanded
pub const MISSING_UNIT_AMOUNTS: &str = "no unit amounts";

/// Why a unit produced no data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The browser for the unit's batch could not be started
    SessionInit(String),

    /// Login did not succeed within the retry budget
    AuthenticationFailed,

    /// The batch aborted before reaching the unit
    BatchFatal(String),

    /// The worker running the batch died unexpectedly
    WorkerCrashed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionInit(e) => write!(f, "session init failed: {}", e),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::BatchFatal(e) => write!(f, "batch failed: {}", e),
            Self::WorkerCrashed(e) => write!(f, "batch worker crashed: {}", e),
        }
    }
}

/// A unit that produced no data; carries only its ID and the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub id: u64,
    pub error: String,
    pub image_url: String,
    pub image_path: String,
}

/// Everything read from one dish or ingredient detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: u64,
    pub name: String,
    pub ingredients: String,
    pub measure_unit: String,
    pub image_url: String,
    pub image_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    pub macronutrients: String,
    pub vitamins: String,
    pub minerals: String,
    pub unit_amounts: String,
}

/// One entry of the detail-mode output, success or failure
///
/// Failures are listed first so an untagged read of a snapshot recognizes
/// them by their `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Failed(FailedRecord),
    Detail(DetailRecord),
}

impl Record {
    /// Builds the failure entry for one unit
    pub fn failed(id: u64, reason: &FailureReason) -> Self {
        Self::Failed(FailedRecord {
            id,
            error: reason.to_string(),
            image_url: String::new(),
            image_path: String::new(),
        })
    }

    /// The unit this record belongs to
    pub fn id(&self) -> u64 {
        match self {
            Self::Failed(r) => r.id,
            Self::Detail(r) => r.id,
        }
    }

    /// Returns true if the unit was extracted
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Detail(_))
    }

    /// The failure message, if any
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(r) => Some(r.error.as_str()),
            Self::Detail(_) => None,
        }
    }
}

/// One row of the paginated dish list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub sequence_no: u64,
    pub page_no: u64,
    pub name: String,
    pub energy: String,
    pub category: String,
    pub ingredients: String,
}

/// One row of the ingredient composition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub primary_category: String,
    pub secondary_category: String,
    pub edible_portion_pct: String,
    pub water_pct: String,
    pub energy_kcal: String,
    pub protein_g: String,
    pub fat_g: String,
    pub carbohydrate_g: String,
    pub sodium_mg: String,
    pub name: String,
}
