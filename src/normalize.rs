//! Schema normalizer: raw upstream rows in, canonical price records out.
//!
//! Row-level problems are absorbed into a [`NormalizationReport`]; the only
//! way to fail a whole batch is a malformed CSV body in [`parse_csv`].

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::error::{FuelError, Result};
use crate::model::{
    CanonicalPriceRecord, RawUpstreamRecord, RawValue, RecordSource, SiteId, TransactionTime,
};
use crate::profile::{CanonicalField, SchemaProfile};

/// Characters some exporters put in front of the first header cell.
const INVISIBLE_PREFIXES: &[char] = &['\u{feff}', '\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}'];

/// Why rows were dropped. A row missing several required fields is counted
/// once, under the first of site id, fuel type, price that it lacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionTally {
    pub missing_site_id: usize,
    pub missing_fuel_type: usize,
    pub missing_price: usize,
}

impl ExclusionTally {
    pub fn total(&self) -> usize {
        self.missing_site_id + self.missing_fuel_type + self.missing_price
    }
}

/// Counters describing one normalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    pub profile: String,
    pub profile_version: u32,
    pub total_rows: usize,
    pub accepted_rows: usize,
    pub excluded_rows: usize,
    pub exclusions: ExclusionTally,
    pub unknown_time_rows: usize,
    /// Upstream columns the profile needs for required fields but that no
    /// input row carried. Non-empty usually means the wrong profile was
    /// selected for this export.
    pub missing_columns: Vec<String>,
}

impl NormalizationReport {
    /// A profile mismatch that left nothing usable at all.
    pub fn schema_mismatch(&self) -> Option<FuelError> {
        (self.total_rows > 0 && self.accepted_rows == 0 && !self.missing_columns.is_empty())
            .then(|| FuelError::SchemaMismatch {
                profile: self.profile.clone(),
                missing: self.missing_columns.clone(),
            })
    }
}

/// Strips a byte-order mark or similar zero-width characters from the start
/// of a column name.
pub fn clean_column_name(name: &str) -> &str {
    name.trim_start_matches(INVISIBLE_PREFIXES).trim()
}

/// Parses a CSV export body into raw records, one per data row.
///
/// Cells that are not valid UTF-8 (older exports are sometimes Latin-1) are
/// decoded lossily, so one odd station name does not cost the whole file.
///
/// # Errors
///
/// Returns [`FuelError::Parse`] if the body is not valid CSV.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<RawUpstreamRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Fields)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| clean_column_name(&String::from_utf8_lossy(h)).to_string())
        .collect();

    let mut rows = Vec::new();
    let mut lossy_rows = 0usize;
    for result in reader.byte_records() {
        let record = result?;
        let mut row = RawUpstreamRecord::new(RecordSource::BulkExport);
        let mut lossy = false;
        for (header, cell) in headers.iter().zip(record.iter()) {
            let text = String::from_utf8_lossy(cell);
            lossy |= matches!(text, std::borrow::Cow::Owned(_));
            row.insert(header.clone(), RawValue::Text(text.into_owned()));
        }
        lossy_rows += usize::from(lossy);
        rows.push(row);
    }

    if lossy_rows > 0 {
        warn!(rows = lossy_rows, "CSV cells were not valid UTF-8 and were decoded lossily");
    }
    debug!(rows = rows.len(), columns = headers.len(), "CSV parsed");
    Ok(rows)
}

/// Canonical-field view of one raw row.
struct MappedRow<'a> {
    values: BTreeMap<CanonicalField, &'a RawValue>,
}

impl<'a> MappedRow<'a> {
    fn new(row: &'a RawUpstreamRecord, profile: &SchemaProfile) -> Self {
        let mut values = BTreeMap::new();
        for (column, value) in &row.fields {
            let Some(field) = profile.columns.get(clean_column_name(column)) else {
                continue;
            };
            // With several columns mapped to one field, keep the first one
            // that actually holds something.
            let current: Option<&&RawValue> = values.get(field);
            if current.is_none_or(|v| v.as_text().is_none()) {
                values.insert(*field, value);
            }
        }
        Self { values }
    }

    fn text(&self, field: CanonicalField) -> Option<String> {
        self.values.get(&field).and_then(|v| v.as_text())
    }

    fn number(&self, field: CanonicalField) -> Option<f64> {
        self.values.get(&field).and_then(|v| v.as_number())
    }
}

/// Normalizes raw rows with the caller-selected `profile`.
///
/// Output is sorted by transaction time, newest first, with unknown-time
/// records last. The sort is stable, so equal keys keep input order and the
/// same input always yields the same output.
pub fn normalize(
    rows: &[RawUpstreamRecord],
    profile: &SchemaProfile,
) -> (Vec<CanonicalPriceRecord>, NormalizationReport) {
    let mut report = NormalizationReport {
        profile: profile.name.clone(),
        profile_version: profile.version,
        total_rows: rows.len(),
        missing_columns: missing_required_columns(rows, profile),
        ..Default::default()
    };

    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let mapped = MappedRow::new(row, profile);

        let Some(site_id) = mapped.text(CanonicalField::SiteId) else {
            report.exclusions.missing_site_id += 1;
            continue;
        };
        let Some(fuel_type) = mapped.text(CanonicalField::FuelType) else {
            report.exclusions.missing_fuel_type += 1;
            continue;
        };
        let Some(price_minor_units) = mapped.number(CanonicalField::Price) else {
            report.exclusions.missing_price += 1;
            continue;
        };

        let transaction_time: TransactionTime = mapped
            .text(CanonicalField::TransactionTime)
            .and_then(|raw| profile.parse_timestamp(&raw))
            .into();
        if !transaction_time.is_known() {
            report.unknown_time_rows += 1;
        }

        records.push(CanonicalPriceRecord {
            site_id: SiteId::new(site_id),
            site_name: mapped.text(CanonicalField::SiteName),
            brand: mapped.text(CanonicalField::Brand),
            address: mapped.text(CanonicalField::Address),
            suburb: mapped.text(CanonicalField::Suburb),
            state: mapped.text(CanonicalField::State),
            postcode: mapped.text(CanonicalField::Postcode),
            latitude: mapped.number(CanonicalField::Latitude),
            longitude: mapped.number(CanonicalField::Longitude),
            fuel_type,
            price_minor_units,
            price_dollars: profile.to_dollars(price_minor_units),
            transaction_time,
        });
    }

    records.sort_by(|a, b| newest_first(&a.transaction_time, &b.transaction_time));

    report.accepted_rows = records.len();
    report.excluded_rows = report.exclusions.total();

    if !report.missing_columns.is_empty() {
        warn!(
            profile = %report.profile,
            missing = ?report.missing_columns,
            "Input lacks columns the profile requires; check the profile selected for this export"
        );
    }
    info!(
        profile = %report.profile,
        total = report.total_rows,
        accepted = report.accepted_rows,
        excluded = report.excluded_rows,
        unknown_time = report.unknown_time_rows,
        "Normalization complete"
    );

    (records, report)
}

/// Newest first; unknown times sort after every known time.
fn newest_first(a: &TransactionTime, b: &TransactionTime) -> Ordering {
    match (a.known(), b.known()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn missing_required_columns(rows: &[RawUpstreamRecord], profile: &SchemaProfile) -> Vec<String> {
    if rows.is_empty() {
        return Vec::new();
    }

    let seen: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.fields.keys())
        .map(|k| clean_column_name(k))
        .collect();

    CanonicalField::REQUIRED
        .iter()
        .flat_map(|field| {
            let candidates = profile.upstream_columns(*field);
            if candidates.iter().any(|c| seen.contains(c)) {
                Vec::new()
            } else {
                candidates.into_iter().map(str::to_string).collect()
            }
        })
        .collect()
}
