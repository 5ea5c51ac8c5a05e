//! Shared data model: raw upstream rows on the way in, canonical price
//! records on the way out.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Where a raw record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Flattened from the authenticated live price API.
    LiveApi,
    /// A row of a published bulk CSV export.
    BulkExport,
}

/// A single untyped cell as received from upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Number(f64),
}

impl RawValue {
    /// Textual view of the value. Empty and whitespace-only text count as
    /// absent, and integral numbers render without a fractional part so an
    /// id of `61401008` stays `"61401008"`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            RawValue::Number(n) if !n.is_finite() => None,
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            RawValue::Number(n) => Some(n.to_string()),
        }
    }

    /// Numeric view of the value. Non-finite values (`NaN`, `inf`) are
    /// treated as missing.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            RawValue::Null => return None,
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }
}

impl From<&serde_json::Value> for RawValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Number(n) => n.as_f64().map_or(RawValue::Null, RawValue::Number),
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            serde_json::Value::Bool(b) => RawValue::Text(b.to_string()),
            other => RawValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// An upstream row keyed by its upstream column names. Consumed once by the
/// normalizer; nothing downstream of it sees untyped fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpstreamRecord {
    pub source: RecordSource,
    pub fields: BTreeMap<String, RawValue>,
}

impl RawUpstreamRecord {
    pub fn new(source: RecordSource) -> Self {
        Self {
            source,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert, mostly for tests and payload flattening.
    pub fn with(mut self, column: &str, value: impl Into<RawValue>) -> Self {
        self.fields.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: RawValue) {
        self.fields.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.fields.get(column)
    }

    /// Builds a record from the top-level members of a JSON object.
    pub fn from_json_object(
        source: RecordSource,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            source,
            fields: object
                .iter()
                .map(|(k, v)| (k.clone(), RawValue::from(v)))
                .collect(),
        }
    }
}

/// Opaque station identifier. Upstream sends it as a string or an integer;
/// either way it is only ever compared, never used in arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// When a price was recorded upstream. Missing or unparseable timestamps
/// are `Unknown`, never a placeholder date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionTime {
    Known(DateTime<Utc>),
    Unknown,
}

impl TransactionTime {
    pub fn known(&self) -> Option<DateTime<Utc>> {
        match self {
            TransactionTime::Known(t) => Some(*t),
            TransactionTime::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, TransactionTime::Known(_))
    }

    /// ISO-8601 rendering, `None` when unknown.
    pub fn to_iso(&self) -> Option<String> {
        self.known()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl From<Option<DateTime<Utc>>> for TransactionTime {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(TransactionTime::Unknown, TransactionTime::Known)
    }
}

/// Serialized as an ISO-8601 string, or `null` when unknown.
impl Serialize for TransactionTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_iso() {
            Some(iso) => serializer.serialize_str(&iso),
            None => serializer.serialize_none(),
        }
    }
}

/// A validated, normalized price observation.
///
/// `site_id`, `fuel_type` and `price_minor_units` are always present; rows
/// lacking any of them never become a `CanonicalPriceRecord`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalPriceRecord {
    pub site_id: SiteId,
    pub site_name: Option<String>,
    pub brand: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub fuel_type: String,
    /// Price in the upstream's own minor-unit denomination.
    pub price_minor_units: f64,
    /// `price_minor_units` divided by the profile's conversion factor.
    pub price_dollars: f64,
    pub transaction_time: TransactionTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_integral_numbers_render_as_plain_ids() {
        assert_eq!(RawValue::Number(61401008.0).as_text().as_deref(), Some("61401008"));
        assert_eq!(RawValue::Number(1.5).as_text().as_deref(), Some("1.5"));
    }

    #[test]
    fn test_blank_text_is_absent() {
        assert_eq!(RawValue::Text("   ".into()).as_text(), None);
        assert_eq!(RawValue::Null.as_text(), None);
    }

    #[test]
    fn test_non_finite_numbers_are_missing() {
        assert_eq!(RawValue::Text("NaN".into()).as_number(), None);
        assert_eq!(RawValue::Text("inf".into()).as_number(), None);
        assert_eq!(RawValue::Number(f64::NAN).as_number(), None);
        assert_eq!(RawValue::Text(" 1940 ".into()).as_number(), Some(1940.0));
    }

    #[test]
    fn test_json_object_conversion() {
        let json = serde_json::json!({"SiteId": 7, "FuelType": "Diesel", "Note": null});
        let record = RawUpstreamRecord::from_json_object(
            RecordSource::LiveApi,
            json.as_object().unwrap(),
        );
        assert_eq!(record.get("SiteId"), Some(&RawValue::Number(7.0)));
        assert_eq!(record.get("FuelType"), Some(&RawValue::Text("Diesel".into())));
        assert_eq!(record.get("Note"), Some(&RawValue::Null));
    }

    #[test]
    fn test_transaction_time_serializes_iso_or_null() {
        let known = TransactionTime::Known(Utc.with_ymd_and_hms(2025, 1, 6, 23, 15, 0).unwrap());
        assert_eq!(
            serde_json::to_value(known).unwrap(),
            serde_json::json!("2025-01-06T23:15:00Z")
        );
        assert_eq!(
            serde_json::to_value(TransactionTime::Unknown).unwrap(),
            serde_json::Value::Null
        );
    }
}
