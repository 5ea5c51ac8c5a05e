//! Query filters and result payloads of the analytics engine.

use serde::Serialize;

use crate::model::{CanonicalPriceRecord, SiteId, TransactionTime};

/// Rendered in place of a timestamp that upstream never supplied.
pub const UNKNOWN_TIME: &str = "unknown";

/// Exact, case-sensitive equality filters. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub fuel_type: Option<String>,
    pub suburb: Option<String>,
}

impl RecordFilter {
    pub fn new(fuel_type: Option<&str>, suburb: Option<&str>) -> Self {
        Self {
            fuel_type: fuel_type.map(str::to_string),
            suburb: suburb.map(str::to_string),
        }
    }

    pub fn matches(&self, record: &CanonicalPriceRecord) -> bool {
        let fuel_ok = self
            .fuel_type
            .as_deref()
            .is_none_or(|f| record.fuel_type == f);
        let suburb_ok = self
            .suburb
            .as_deref()
            .is_none_or(|s| record.suburb.as_deref() == Some(s));
        fuel_ok && suburb_ok
    }
}

/// Earliest and latest known transaction time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: TransactionTime,
    pub end: TransactionTime,
}

/// Descriptive statistics over `price_dollars`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation, omitted below two records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub total_records: usize,
    pub unique_stations: usize,
    pub date_range: DateRange,
    pub price_stats: PriceStats,
}

/// Result of a trend query: a summary, or a distinguished "nothing matched".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendOutcome {
    Summary(TrendSummary),
    NoData,
}

impl TrendOutcome {
    pub fn summary(&self) -> Option<&TrendSummary> {
        match self {
            TrendOutcome::Summary(s) => Some(s),
            TrendOutcome::NoData => None,
        }
    }
}

/// One station in a cheapest-N ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStation {
    pub rank: usize,
    pub site_id: SiteId,
    pub site_name: Option<String>,
    pub brand: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub postcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub fuel_type: String,
    /// Price in dollars.
    pub price: f64,
    /// ISO-8601 source timestamp, or [`UNKNOWN_TIME`].
    pub last_updated: String,
}

/// Distinct values present in a table, for building filter choices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub fuel_types: Vec<String>,
    pub suburbs: Vec<String>,
    pub brands: Vec<String>,
}
