use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde_json::Value;
use tracing::warn;

use super::ApiStatus;
use fuel_prices::error::{FuelError, Result};
use fuel_prices::fetch::{HttpClient, fetch_bytes, fetch_json};
use fuel_prices::services::{CatalogApi, CatalogKind, RegionSelector};

const VERSION_PATH: &str = "/Version";

/// Client for the Queensland fuel price reporting API.
///
/// `C` carries the credential, normally an
/// [`ApiKey`](fuel_prices::fetch::auth::ApiKey) using the subscriber token
/// scheme.
pub struct FuelPriceApiClient<C> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> FuelPriceApiClient<C> {
    pub fn new(client: C, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(kind: CatalogKind) -> &'static str {
        match kind {
            CatalogKind::FuelTypes => "/Subscriber/GetCountryFuelTypes",
            CatalogKind::Regions => "/Subscriber/GetCountryGeographicRegions",
            CatalogKind::Brands => "/Subscriber/GetCountryBrands",
            CatalogKind::Sites => "/Subscriber/GetFullSiteDetails",
            CatalogKind::LivePrices => "/Price/GetSitesPrices",
        }
    }

    /// Every path this client calls, for status reports.
    pub fn endpoints() -> Vec<&'static str> {
        std::iter::once(VERSION_PATH)
            .chain(CatalogKind::ALL.into_iter().map(Self::endpoint))
            .collect()
    }

    /// Version string reported by `GET /Version`. The API answers with a
    /// JSON string; a bare text body is accepted too.
    ///
    /// # Errors
    ///
    /// [`FuelError::Status`] for a non-success reply, [`FuelError::Transport`]
    /// when the API cannot be reached.
    #[tracing::instrument(skip(self))]
    pub async fn version(&self) -> Result<String> {
        let url = format!("{}{VERSION_PATH}", self.base_url);
        let body = fetch_bytes(&self.client, &url).await?;
        let version = match serde_json::from_slice::<Value>(&body) {
            Ok(Value::String(version)) => version,
            _ => String::from_utf8_lossy(&body).trim().trim_matches('"').to_string(),
        };
        if version.is_empty() {
            return Err(FuelError::Parse("empty version response".into()));
        }
        Ok(version)
    }

    /// Checks connectivity through the version endpoint. Never fails; an
    /// unreachable API shows up in [`ApiStatus::connectivity`].
    pub async fn status(&self) -> ApiStatus {
        let (api_version, connectivity) = match self.version().await {
            Ok(version) => (Some(version), "OK".to_string()),
            Err(err) => {
                warn!(error = %err, "Version check failed");
                (None, format!("ERROR: {err}"))
            }
        };
        ApiStatus {
            timestamp: Utc::now(),
            api_version,
            base_url: self.base_url.clone(),
            endpoints: Self::endpoints(),
            connectivity,
        }
    }

    fn url(
        &self,
        kind: CatalogKind,
        country_id: u32,
        region: Option<RegionSelector>,
    ) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, Self::endpoint(kind));
        let mut url = Url::parse(&raw)
            .map_err(|e| FuelError::Config(format!("invalid API url '{raw}': {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("countryId", &country_id.to_string());
            if let Some(region) = region {
                query
                    .append_pair("geoRegionLevel", &region.level.to_string())
                    .append_pair("geoRegionId", &region.id.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> CatalogApi for FuelPriceApiClient<C> {
    #[tracing::instrument(skip(self, kind), fields(%kind))]
    async fn fetch_catalog(
        &self,
        kind: CatalogKind,
        country_id: u32,
        region: Option<RegionSelector>,
    ) -> Result<Value> {
        let url = self.url(kind, country_id, region)?;
        let body = fetch_json(&self.client, url.as_str()).await?;

        // The API reports some failures as a 200 with an error object.
        if let Some(message) = body.get("error").and_then(Value::as_str) {
            return Err(FuelError::Status {
                status: 200,
                body: message.to_string(),
            });
        }
        Ok(body)
    }
}
