use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::analytics::trend::filter_records;
use crate::analytics::types::{RankedStation, RecordFilter, UNKNOWN_TIME};
use crate::model::{CanonicalPriceRecord, SiteId};

/// Cheapest `limit` stations selling `fuel_type`, optionally within `suburb`.
///
/// Each station is ranked on a single record: the one with the latest known
/// transaction time. A station with only unknown-time records is ranked on
/// the last of those in table order. That fallback leans on the normalizer
/// sorting newest-first with unknown times last, so "last encountered" is
/// deterministic for any table produced by [`crate::normalize::normalize`].
///
/// Ties on price are broken by ascending site id.
pub fn cheapest(
    table: &[CanonicalPriceRecord],
    fuel_type: &str,
    suburb: Option<&str>,
    limit: NonZeroUsize,
) -> Vec<RankedStation> {
    let filter = RecordFilter::new(Some(fuel_type), suburb);

    let mut latest: HashMap<&SiteId, &CanonicalPriceRecord> = HashMap::new();
    for record in filter_records(table, &filter) {
        let replace = latest
            .get(&record.site_id)
            .is_none_or(|current| supersedes(record, current));
        if replace {
            latest.insert(&record.site_id, record);
        }
    }

    let mut stations: Vec<&CanonicalPriceRecord> = latest.into_values().collect();
    stations.sort_by(|a, b| {
        a.price_dollars
            .total_cmp(&b.price_dollars)
            .then_with(|| a.site_id.cmp(&b.site_id))
    });

    stations
        .into_iter()
        .take(limit.get())
        .enumerate()
        .map(|(i, r)| ranked(i + 1, r))
        .collect()
}

/// Whether `candidate`, seen after `current` in table order, should replace
/// it as the station's ranking record.
fn supersedes(candidate: &CanonicalPriceRecord, current: &CanonicalPriceRecord) -> bool {
    match (
        candidate.transaction_time.known(),
        current.transaction_time.known(),
    ) {
        (Some(c), Some(k)) => c >= k,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

fn ranked(rank: usize, record: &CanonicalPriceRecord) -> RankedStation {
    RankedStation {
        rank,
        site_id: record.site_id.clone(),
        site_name: record.site_name.clone(),
        brand: record.brand.clone(),
        address: record.address.clone(),
        suburb: record.suburb.clone(),
        postcode: record.postcode.clone(),
        latitude: record.latitude,
        longitude: record.longitude,
        fuel_type: record.fuel_type.clone(),
        price: record.price_dollars,
        last_updated: record
            .transaction_time
            .to_iso()
            .unwrap_or_else(|| UNKNOWN_TIME.to_string()),
    }
}
