//! Flattens live API payloads into raw records for the `qld-live-api`
//! profile.
//!
//! `GetSitesPrices` only carries ids, so names are joined in from the
//! reference listings when the caller has them. An id that cannot be
//! resolved is kept as its textual id rather than dropped.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{FuelError, Result};
use crate::model::{RawUpstreamRecord, RawValue, RecordSource};

/// Optional reference payloads used to resolve ids in a price listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveLookups<'a> {
    /// `{"Fuels":[{"FuelId":2,"Name":"Unleaded"}]}`
    pub fuel_types: Option<&'a Value>,
    /// `{"Brands":[{"BrandId":5,"Name":"Shell"}]}`
    pub brands: Option<&'a Value>,
    /// `{"S":[{"S":61401008,"N":"…","A":"…","B":5,"P":"4066","G1":12,"Lat":…,"Lng":…}]}`
    pub sites: Option<&'a Value>,
    /// `{"GeographicRegions":[{"GeographicRegionLevel":1,"GeographicRegionId":12,"Name":"…"}]}`
    pub regions: Option<&'a Value>,
}

fn id_of(value: &Value) -> Option<String> {
    RawValue::from(value).as_text()
}

fn items<'a>(payload: &'a Value, key: &'static str) -> impl Iterator<Item = &'a Value> + 'a {
    payload
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn names(payload: Option<&Value>, list: &'static str, id_key: &str) -> HashMap<String, String> {
    payload
        .into_iter()
        .flat_map(|p| items(p, list))
        .filter_map(|item| {
            let id = id_of(item.get(id_key)?)?;
            let name = item.get("Name")?.as_str()?.trim().to_string();
            Some((id, name))
        })
        .collect()
}

fn suburb_names(regions: Option<&Value>) -> HashMap<String, String> {
    regions
        .into_iter()
        .flat_map(|p| items(p, "GeographicRegions"))
        .filter(|r| r.get("GeographicRegionLevel").and_then(Value::as_u64) == Some(1))
        .filter_map(|r| {
            let id = id_of(r.get("GeographicRegionId")?)?;
            let name = r.get("Name")?.as_str()?.trim().to_string();
            Some((id, name))
        })
        .collect()
}

fn sites_by_id(sites: Option<&Value>) -> HashMap<String, &serde_json::Map<String, Value>> {
    sites
        .into_iter()
        .flat_map(|p| items(p, "S"))
        .filter_map(|site| {
            let site = site.as_object()?;
            Some((id_of(site.get("S")?)?, site))
        })
        .collect()
}

fn resolved(id: &Value, names: &HashMap<String, String>) -> RawValue {
    match id_of(id) {
        Some(key) => RawValue::Text(names.get(&key).cloned().unwrap_or(key)),
        None => RawValue::Null,
    }
}

/// Turns a `{"SitePrices":[…]}` payload into one raw record per price.
///
/// # Errors
///
/// Returns [`FuelError::Parse`] if the payload has no `SitePrices` array.
pub fn flatten_site_prices(
    prices: &Value,
    lookups: &LiveLookups<'_>,
) -> Result<Vec<RawUpstreamRecord>> {
    let listing = prices
        .get("SitePrices")
        .and_then(Value::as_array)
        .ok_or_else(|| FuelError::Parse("live price payload has no SitePrices array".into()))?;

    let fuels = names(lookups.fuel_types, "Fuels", "FuelId");
    let brands = names(lookups.brands, "Brands", "BrandId");
    let suburbs = suburb_names(lookups.regions);
    let sites = sites_by_id(lookups.sites);

    let mut records = Vec::with_capacity(listing.len());
    for entry in listing {
        let Some(entry) = entry.as_object() else {
            debug!("Skipping non-object SitePrices entry");
            continue;
        };

        let mut record = RawUpstreamRecord::new(RecordSource::LiveApi);
        let site_id = entry.get("SiteId").unwrap_or(&Value::Null);
        record.insert("SiteId", RawValue::from(site_id));
        record.insert(
            "FuelType",
            resolved(entry.get("FuelId").unwrap_or(&Value::Null), &fuels),
        );
        record.insert("Price", RawValue::from(entry.get("Price").unwrap_or(&Value::Null)));
        record.insert(
            "TransactionDateUtc",
            RawValue::from(entry.get("TransactionDateUtc").unwrap_or(&Value::Null)),
        );

        if let Some(site) = id_of(site_id).and_then(|id| sites.get(&id)) {
            let copied = [
                ("N", "SiteName"),
                ("A", "Address"),
                ("P", "Postcode"),
                ("Lat", "Lat"),
                ("Lng", "Lng"),
            ];
            for (from, to) in copied {
                if let Some(value) = site.get(from) {
                    record.insert(to, RawValue::from(value));
                }
            }
            if let Some(brand) = site.get("B") {
                record.insert("Brand", resolved(brand, &brands));
            }
            if let Some(suburb) = site.get("G1").and_then(id_of).and_then(|g| suburbs.get(&g)) {
                record.insert("Suburb", RawValue::Text(suburb.clone()));
            }
        }

        records.push(record);
    }

    debug!(records = records.len(), "Live prices flattened");
    Ok(records)
}
