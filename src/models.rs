//! Plain data structs shared across the crate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Fallback when the registry file carries no runoff coefficient column:
/// assume the whole rooftop drains into the collection system.
pub const DEFAULT_RUNOFF_COEFFICIENT: f64 = 1.0;

/// One row of the building registry. Immutable at runtime; edited only by
/// hand in `buildings.csv`.
#[derive(Debug, Clone, Serialize)]
pub struct Building {
    pub id: String,
    pub name: String,
    pub rooftop_area_m2: f64,
    /// Fraction of rainfall over the rooftop that actually reaches the
    /// collection system, in (0, 1].
    pub runoff_coefficient: f64,
}

/// One daily measurement in the rainfall log. `date` is the unique key;
/// re-ingesting the same day replaces the row (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainfallRecord {
    pub date: NaiveDate,
    pub rainfall_mm: f64,
    pub source_fetched_at: DateTime<Utc>,
}
