use std::collections::{BTreeSet, HashSet};

use crate::analytics::types::{
    DateRange, Dimensions, PriceStats, RecordFilter, TrendOutcome, TrendSummary,
};
use crate::analytics::utility::{max, mean, median, min, sample_stddev};
use crate::model::{CanonicalPriceRecord, TransactionTime};

/// Records matching `filter`, in table order.
pub fn filter_records<'a>(
    table: &'a [CanonicalPriceRecord],
    filter: &'a RecordFilter,
) -> impl Iterator<Item = &'a CanonicalPriceRecord> + 'a {
    table.iter().filter(move |r| filter.matches(r))
}

/// Price distribution of the records matching `filter`.
///
/// Returns [`TrendOutcome::NoData`] when nothing matches.
pub fn summarize(table: &[CanonicalPriceRecord], filter: &RecordFilter) -> TrendOutcome {
    let matching: Vec<&CanonicalPriceRecord> = filter_records(table, filter).collect();

    let prices: Vec<f64> = matching.iter().map(|r| r.price_dollars).collect();
    let (Some(min), Some(max), Some(mean), Some(median)) =
        (min(&prices), max(&prices), mean(&prices), median(&prices))
    else {
        return TrendOutcome::NoData;
    };

    let unique_stations = matching
        .iter()
        .map(|r| &r.site_id)
        .collect::<HashSet<_>>()
        .len();

    let known_times = || matching.iter().filter_map(|r| r.transaction_time.known());
    let start = known_times().min();
    let end = known_times().max();

    TrendOutcome::Summary(TrendSummary {
        total_records: matching.len(),
        unique_stations,
        date_range: DateRange {
            start: TransactionTime::from(start),
            end: TransactionTime::from(end),
        },
        price_stats: PriceStats {
            min,
            max,
            mean,
            median,
            std_dev: sample_stddev(&prices, mean),
        },
    })
}

/// Sorted distinct fuel types, suburbs and brands in `table`.
pub fn dimensions(table: &[CanonicalPriceRecord]) -> Dimensions {
    let mut fuel_types = BTreeSet::new();
    let mut suburbs = BTreeSet::new();
    let mut brands = BTreeSet::new();

    for record in table {
        fuel_types.insert(record.fuel_type.clone());
        if let Some(suburb) = &record.suburb {
            suburbs.insert(suburb.clone());
        }
        if let Some(brand) = &record.brand {
            brands.insert(brand.clone());
        }
    }

    Dimensions {
        fuel_types: fuel_types.into_iter().collect(),
        suburbs: suburbs.into_iter().collect(),
        brands: brands.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::record;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_no_matching_fuel_type_is_no_data() {
        let table = vec![record("1", "Unleaded", 1.80, None)];
        let outcome = summarize(&table, &RecordFilter::new(Some("Diesel"), None));

        assert_eq!(outcome, TrendOutcome::NoData);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"status": "no_data"})
        );
    }

    #[test]
    fn test_empty_table_is_no_data() {
        assert_eq!(summarize(&[], &RecordFilter::default()), TrendOutcome::NoData);
    }

    #[test]
    fn test_summary_statistics() {
        let table = vec![
            record("1", "Unleaded", 1.80, Some("2025-01-03T08:00:00Z")),
            record("2", "Unleaded", 1.70, Some("2025-01-01T08:00:00Z")),
            record("1", "Unleaded", 1.90, None),
            record("3", "Diesel", 2.10, Some("2025-01-09T08:00:00Z")),
        ];
        let outcome = summarize(&table, &RecordFilter::new(Some("Unleaded"), None));
        let summary = outcome.summary().unwrap();

        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.unique_stations, 2);
        assert_eq!(summary.price_stats.min, 1.70);
        assert_eq!(summary.price_stats.max, 1.90);
        assert_eq!(summary.price_stats.median, 1.80);
        assert!((summary.price_stats.mean - 1.80).abs() < 1e-9);
        assert!((summary.price_stats.std_dev.unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(
            summary.date_range.start,
            TransactionTime::Known(Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(
            summary.date_range.end,
            TransactionTime::Known(Utc.with_ymd_and_hms(2025, 1, 3, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_single_record_omits_std_dev() {
        let table = vec![record("1", "Diesel", 2.00, None)];
        let outcome = summarize(&table, &RecordFilter::default());
        let summary = outcome.summary().unwrap();

        assert_eq!(summary.price_stats.std_dev, None);
        assert_eq!(summary.date_range.start, TransactionTime::Unknown);
        assert_eq!(summary.date_range.end, TransactionTime::Unknown);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "summary");
        assert!(json["price_stats"].get("std_dev").is_none());
        assert!(json["date_range"]["start"].is_null());
    }

    #[test]
    fn test_suburb_filter_is_case_sensitive() {
        let mut a = record("1", "Unleaded", 1.80, None);
        a.suburb = Some("Brisbane City".into());
        let mut b = record("2", "Unleaded", 1.85, None);
        b.suburb = Some("brisbane city".into());
        let table = vec![a, b];

        let outcome = summarize(&table, &RecordFilter::new(None, Some("Brisbane City")));
        assert_eq!(outcome.summary().unwrap().total_records, 1);
    }

    #[test]
    fn test_dimensions_are_sorted_and_distinct() {
        let mut a = record("1", "Unleaded", 1.80, None);
        a.brand = Some("Shell".into());
        a.suburb = Some("Toowong".into());
        let mut b = record("2", "Diesel", 1.95, None);
        b.brand = Some("Ampol".into());
        let c = record("3", "Unleaded", 1.75, None);

        let dims = dimensions(&[a, b, c]);
        assert_eq!(dims.fuel_types, ["Diesel", "Unleaded"]);
        assert_eq!(dims.suburbs, ["Toowong"]);
        assert_eq!(dims.brands, ["Ampol", "Shell"]);
    }
}
