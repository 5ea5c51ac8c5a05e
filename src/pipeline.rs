//! Cache-fronted orchestration of the live API and the monthly exports.
//!
//! Every network-backed read goes through a [`TimedCache`], so a dashboard
//! refreshing every few seconds still costs one upstream request per key and
//! TTL window. Tables are normalized once and shared behind `Arc`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{Cached, TimedCache};
use crate::config::Settings;
use crate::error::{FuelError, Result};
use crate::live::{LiveLookups, flatten_site_prices};
use crate::model::{CanonicalPriceRecord, RawUpstreamRecord};
use crate::normalize::{NormalizationReport, normalize, parse_csv};
use crate::profile::{ProfileRegistry, QLD_LIVE_API, SchemaProfile};
use crate::services::{BulkExportSource, CatalogApi, CatalogKind, ExportOutcome, RegionSelector};

/// One normalized snapshot and how it came to be.
#[derive(Debug, Clone)]
pub struct PriceTable {
    pub records: Vec<CanonicalPriceRecord>,
    pub report: NormalizationReport,
    pub profile: String,
    pub loaded_at: DateTime<Utc>,
}

impl PriceTable {
    /// Normalizes `rows` with `profile`.
    ///
    /// # Errors
    ///
    /// [`FuelError::Config`] for a profile that fails
    /// [`SchemaProfile::validate`], and [`FuelError::SchemaMismatch`] when
    /// the profile matched none of the rows' columns and nothing was
    /// accepted.
    pub fn from_rows(rows: &[RawUpstreamRecord], profile: &SchemaProfile) -> Result<Self> {
        profile.validate()?;
        let (records, report) = normalize(rows, profile);
        if let Some(err) = report.schema_mismatch() {
            return Err(err);
        }
        Ok(Self {
            records,
            report,
            profile: profile.name.clone(),
            loaded_at: Utc::now(),
        })
    }

    /// Parses and normalizes a CSV export body.
    pub fn from_csv(body: &[u8], profile: &SchemaProfile) -> Result<Self> {
        Self::from_rows(&parse_csv(body)?, profile)
    }
}

/// Why a table load produced nothing. `NoDataset` is shared with waiters
/// like a failure but never cached.
#[derive(Debug, Clone)]
enum TableMiss {
    NoDataset,
    Failed(FuelError),
}

impl From<FuelError> for TableMiss {
    fn from(err: FuelError) -> Self {
        TableMiss::Failed(err)
    }
}

pub fn catalog_key(kind: CatalogKind, country_id: u32, region: Option<RegionSelector>) -> String {
    match region {
        Some(r) => format!("{kind}_{country_id}_{}_{}", r.level, r.id),
        None => format!("{kind}_{country_id}"),
    }
}

pub fn historical_key(year: i32, month: u32) -> String {
    format!("historical_{year}_{month:02}")
}

pub fn live_key(country_id: u32, region: RegionSelector) -> String {
    format!("live_{country_id}_{}_{}", region.level, region.id)
}

/// Age of one cached entry, as reported by the status command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheAge {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub age_secs: u64,
}

impl CacheAge {
    fn of<V>(key: String, cached: &Cached<V>) -> Self {
        Self {
            key,
            stored_at: cached.stored_at,
            age_secs: cached.age.as_secs(),
        }
    }
}

pub struct Pipeline<C, X> {
    catalog_api: C,
    exports: X,
    profiles: ProfileRegistry,
    country_id: u32,
    default_region: RegionSelector,
    catalog_ttl: Duration,
    snapshot_ttl: Duration,
    catalogs: TimedCache<Arc<Value>>,
    tables: TimedCache<Arc<PriceTable>, TableMiss>,
}

impl<C: CatalogApi, X: BulkExportSource> Pipeline<C, X> {
    pub fn new(catalog_api: C, exports: X, profiles: ProfileRegistry, settings: &Settings) -> Self {
        Self {
            catalog_api,
            exports,
            profiles,
            country_id: settings.country_id,
            default_region: settings.default_region,
            catalog_ttl: settings.catalog_ttl,
            snapshot_ttl: settings.snapshot_ttl,
            catalogs: TimedCache::new(),
            tables: TimedCache::new(),
        }
    }

    pub fn catalog_api(&self) -> &C {
        &self.catalog_api
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn country_id(&self) -> u32 {
        self.country_id
    }

    pub fn default_region(&self) -> RegionSelector {
        self.default_region
    }

    /// One catalog listing, cached for the catalog TTL. Regional listings
    /// fall back to the default region.
    pub async fn catalog(
        &self,
        kind: CatalogKind,
        region: Option<RegionSelector>,
    ) -> Result<Arc<Value>> {
        let region = match region {
            Some(r) => Some(r),
            None if kind.is_regional() => Some(self.default_region),
            None => None,
        };
        let key = catalog_key(kind, self.country_id, region);
        let country_id = self.country_id;

        self.catalogs
            .get_or_compute(&key, self.catalog_ttl, || async move {
                let value = self
                    .catalog_api
                    .fetch_catalog(kind, country_id, region)
                    .await?;
                Ok(Arc::new(value))
            })
            .await
    }

    /// Normalized export for one month, cached for the snapshot TTL.
    ///
    /// Returns `Ok(None)` when nothing is published for that period.
    #[tracing::instrument(skip(self))]
    pub async fn historical(&self, year: i32, month: u32) -> Result<Option<Arc<PriceTable>>> {
        if !(1..=12).contains(&month) {
            return Err(FuelError::Config(format!("month {month} is out of range")));
        }
        let key = historical_key(year, month);

        let loaded = self
            .tables
            .get_or_compute(&key, self.snapshot_ttl, || async move {
                let ExportOutcome::Downloaded { body, profile } =
                    self.exports.fetch_bulk_export(year, month).await?
                else {
                    return Err(TableMiss::NoDataset);
                };
                let profile = self.profiles.get(&profile)?;
                let table = PriceTable::from_csv(&body, profile)?;
                Ok(Arc::new(table))
            })
            .await;

        match loaded {
            Ok(table) => Ok(Some(table)),
            Err(TableMiss::NoDataset) => {
                info!(year, month, "No export published for period");
                Ok(None)
            }
            Err(TableMiss::Failed(err)) => Err(err),
        }
    }

    /// Normalized live prices for `region`, cached for the catalog TTL.
    ///
    /// Reference listings are best effort: if one cannot be fetched its ids
    /// are kept unresolved.
    #[tracing::instrument(skip(self))]
    pub async fn live(&self, region: Option<RegionSelector>) -> Result<Arc<PriceTable>> {
        let region = region.unwrap_or(self.default_region);
        let key = live_key(self.country_id, region);
        let country_id = self.country_id;

        let loaded = self
            .tables
            .get_or_compute(&key, self.catalog_ttl, || async move {
                let prices = self
                    .catalog_api
                    .fetch_catalog(CatalogKind::LivePrices, country_id, Some(region))
                    .await?;

                let (fuel_types, brands, sites, regions) = tokio::join!(
                    self.lookup(CatalogKind::FuelTypes, None),
                    self.lookup(CatalogKind::Brands, None),
                    self.lookup(CatalogKind::Sites, Some(region)),
                    self.lookup(CatalogKind::Regions, None),
                );
                let lookups = LiveLookups {
                    fuel_types: fuel_types.as_deref(),
                    brands: brands.as_deref(),
                    sites: sites.as_deref(),
                    regions: regions.as_deref(),
                };

                let rows = flatten_site_prices(&prices, &lookups)?;
                let profile = self.profiles.get(QLD_LIVE_API)?;
                Ok(Arc::new(PriceTable::from_rows(&rows, profile)?))
            })
            .await;

        match loaded {
            Ok(table) => Ok(table),
            Err(TableMiss::Failed(err)) => Err(err),
            Err(TableMiss::NoDataset) => Err(FuelError::Parse("live listing unavailable".into())),
        }
    }

    async fn lookup(&self, kind: CatalogKind, region: Option<RegionSelector>) -> Option<Arc<Value>> {
        match self.catalog(kind, region).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%kind, error = %err, "Reference listing unavailable, ids left unresolved");
                None
            }
        }
    }

    /// Last table stored under `key` regardless of age, for serving stale
    /// data after a failed refresh.
    pub fn stale(&self, key: &str) -> Option<Cached<Arc<PriceTable>>> {
        self.tables.cached(key)
    }

    pub fn stale_catalog(&self, key: &str) -> Option<Cached<Arc<Value>>> {
        self.catalogs.cached(key)
    }

    /// Ages of the catalog listings and the live table for `region` that are
    /// currently cached, keyed as in [`catalog_key`] and [`live_key`].
    pub fn cache_ages(&self, region: Option<RegionSelector>) -> Vec<CacheAge> {
        let region = region.unwrap_or(self.default_region);
        let mut ages: Vec<CacheAge> = CatalogKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let key = catalog_key(kind, self.country_id, kind.is_regional().then_some(region));
                let cached = self.stale_catalog(&key)?;
                Some(CacheAge::of(key, &cached))
            })
            .collect();

        let key = live_key(self.country_id, region);
        if let Some(cached) = self.stale(&key) {
            ages.push(CacheAge::of(key, &cached));
        }
        ages
    }

    /// Drops every cached entry for `key` so the next read refetches.
    pub fn invalidate(&self, key: &str) {
        self.tables.invalidate(key);
        self.catalogs.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHANGES_CSV: &str = "\u{feff}SiteId,Site_Name,Site_Suburb,Fuel_Type,Price,TransactionDateutc\n\
        1,Alpha,Toowong,Unleaded,1940,2025-01-02T08:00:00\n\
        2,Beta,Milton,Unleaded,1875,2025-01-03T08:00:00\n\
        3,Gamma,Milton,Diesel,,2025-01-03T09:00:00\n";

    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        fail_brands: bool,
    }

    impl FakeApi {
        fn calls_to(&self, kind: CatalogKind) -> usize {
            let calls = self.calls.lock().unwrap();
            calls.iter().filter(|c| c.starts_with(kind.as_str())).count()
        }
    }

    #[async_trait::async_trait]
    impl CatalogApi for FakeApi {
        async fn fetch_catalog(
            &self,
            kind: CatalogKind,
            country_id: u32,
            region: Option<RegionSelector>,
        ) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(catalog_key(kind, country_id, region));
            match kind {
                CatalogKind::FuelTypes => Ok(json!({"Fuels": [{"FuelId": 2, "Name": "Unleaded"}]})),
                CatalogKind::Brands if self.fail_brands => Err(FuelError::Status {
                    status: 503,
                    body: "busy".into(),
                }),
                CatalogKind::Brands => Ok(json!({"Brands": [{"BrandId": 5, "Name": "Shell"}]})),
                CatalogKind::Sites => Ok(json!({"S": [{"S": 10, "N": "Shell Milton", "B": 5, "G1": 4}]})),
                CatalogKind::Regions => Ok(json!({"GeographicRegions": [
                    {"GeographicRegionLevel": 1, "GeographicRegionId": 4, "Name": "Milton"}
                ]})),
                CatalogKind::LivePrices => Ok(json!({"SitePrices": [
                    {"SiteId": 10, "FuelId": 2, "Price": 1899.0, "TransactionDateUtc": "2025-01-06T01:00:00"}
                ]})),
            }
        }
    }

    #[derive(Default)]
    struct FakeExports {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl BulkExportSource for FakeExports {
        async fn fetch_bulk_export(&self, year: i32, month: u32) -> Result<ExportOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FuelError::Transport("connection reset".into()));
            }
            match (year, month) {
                (2025, 1) => Ok(ExportOutcome::Downloaded {
                    body: CHANGES_CSV.as_bytes().to_vec(),
                    profile: "qld-open-data-changes".into(),
                }),
                (2024, 6) => Ok(ExportOutcome::Downloaded {
                    body: CHANGES_CSV.as_bytes().to_vec(),
                    profile: "not-a-profile".into(),
                }),
                _ => Ok(ExportOutcome::NoDataset),
            }
        }
    }

    fn pipeline(api: FakeApi, exports: FakeExports) -> Pipeline<FakeApi, FakeExports> {
        Pipeline::new(api, exports, ProfileRegistry::builtin(), &Settings::default())
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(catalog_key(CatalogKind::FuelTypes, 21, None), "fuel_types_21");
        assert_eq!(
            catalog_key(CatalogKind::Sites, 21, Some(RegionSelector::default())),
            "sites_21_3_1"
        );
        assert_eq!(historical_key(2025, 1), "historical_2025_01");
        assert_eq!(live_key(21, RegionSelector { level: 1, id: 4 }), "live_21_1_4");
    }

    #[tokio::test]
    async fn test_historical_normalizes_and_caches() {
        let p = pipeline(FakeApi::default(), FakeExports::default());

        let table = p.historical(2025, 1).await.unwrap().unwrap();
        assert_eq!(table.profile, "qld-open-data-changes");
        assert_eq!(table.report.accepted_rows, 2);
        assert_eq!(table.report.exclusions.missing_price, 1);
        assert_eq!(table.records[0].site_id.as_str(), "2");
        assert_eq!(table.records[0].price_dollars, 1.875);

        let again = p.historical(2025, 1).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&table, &again));
        assert_eq!(p.exports.calls.load(Ordering::SeqCst), 1);
        assert!(p.stale("historical_2025_01").is_some());
    }

    #[tokio::test]
    async fn test_missing_period_is_none_and_not_cached() {
        let p = pipeline(FakeApi::default(), FakeExports::default());

        assert!(p.historical(2023, 3).await.unwrap().is_none());
        assert!(p.historical(2023, 3).await.unwrap().is_none());
        assert_eq!(p.exports.calls.load(Ordering::SeqCst), 2);
        assert!(p.stale("historical_2023_03").is_none());
    }

    #[tokio::test]
    async fn test_invalid_month_is_rejected_without_fetching() {
        let p = pipeline(FakeApi::default(), FakeExports::default());
        assert!(matches!(p.historical(2025, 13).await, Err(FuelError::Config(_))));
        assert_eq!(p.exports.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_profile_is_config_error() {
        let p = pipeline(FakeApi::default(), FakeExports::default());
        assert!(matches!(p.historical(2024, 6).await, Err(FuelError::Config(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let exports = FakeExports {
            fail: true,
            ..FakeExports::default()
        };
        let p = pipeline(FakeApi::default(), exports);

        let err = p.historical(2025, 1).await.unwrap_err();
        assert!(err.is_transport());
        assert!(p.stale("historical_2025_01").is_none());
    }

    #[tokio::test]
    async fn test_catalog_is_cached_per_key() {
        let p = pipeline(FakeApi::default(), FakeExports::default());

        p.catalog(CatalogKind::FuelTypes, None).await.unwrap();
        p.catalog(CatalogKind::FuelTypes, None).await.unwrap();
        p.catalog(CatalogKind::Sites, None).await.unwrap();

        assert_eq!(p.catalog_api.calls_to(CatalogKind::FuelTypes), 1);
        let calls = p.catalog_api.calls.lock().unwrap();
        assert!(calls.contains(&"sites_21_3_1".to_string()));
    }

    #[tokio::test]
    async fn test_live_joins_lookups() {
        let p = pipeline(FakeApi::default(), FakeExports::default());

        let table = p.live(None).await.unwrap();
        assert_eq!(table.profile, QLD_LIVE_API);
        let record = &table.records[0];
        assert_eq!(record.fuel_type, "Unleaded");
        assert_eq!(record.brand.as_deref(), Some("Shell"));
        assert_eq!(record.suburb.as_deref(), Some("Milton"));
        assert_eq!(record.price_dollars, 1.899);

        p.live(None).await.unwrap();
        assert_eq!(p.catalog_api.calls_to(CatalogKind::LivePrices), 1);
    }

    #[tokio::test]
    async fn test_live_survives_missing_lookup() {
        let api = FakeApi {
            fail_brands: true,
            ..FakeApi::default()
        };
        let p = pipeline(api, FakeExports::default());

        let table = p.live(None).await.unwrap();
        assert_eq!(table.records[0].brand.as_deref(), Some("5"));
    }

    #[test]
    fn test_wrong_profile_is_schema_mismatch() {
        let err = PriceTable::from_csv(CHANGES_CSV.as_bytes(), &SchemaProfile::qld_live_api())
            .unwrap_err();
        assert!(matches!(err, FuelError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_zero_conversion_factor_is_rejected() {
        let profile = SchemaProfile {
            minor_units_per_dollar: 0.0,
            ..SchemaProfile::qld_open_data_changes()
        };
        let err = PriceTable::from_csv(CHANGES_CSV.as_bytes(), &profile).unwrap_err();
        assert!(matches!(err, FuelError::Config(_)));
    }

    #[tokio::test]
    async fn test_cache_ages_list_loaded_entries() {
        let p = pipeline(FakeApi::default(), FakeExports::default());
        assert!(p.cache_ages(None).is_empty());

        p.live(None).await.unwrap();

        let keys: Vec<_> = p.cache_ages(None).into_iter().map(|a| a.key).collect();
        assert_eq!(
            keys,
            [
                "fuel_types_21",
                "regions_21",
                "brands_21",
                "sites_21_3_1",
                "live_21_3_1"
            ]
        );
        assert_eq!(p.cache_ages(Some(RegionSelector { level: 1, id: 4 })).len(), 3);
    }
}
