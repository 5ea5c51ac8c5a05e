//! Trait and types for the authenticated live price API.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// The reference and price listings the live API publishes per country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    FuelTypes,
    Regions,
    Brands,
    Sites,
    LivePrices,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 5] = [
        CatalogKind::FuelTypes,
        CatalogKind::Regions,
        CatalogKind::Brands,
        CatalogKind::Sites,
        CatalogKind::LivePrices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::FuelTypes => "fuel_types",
            CatalogKind::Regions => "regions",
            CatalogKind::Brands => "brands",
            CatalogKind::Sites => "sites",
            CatalogKind::LivePrices => "live_prices",
        }
    }

    /// Site and price listings are scoped to a geographic region.
    pub fn is_regional(&self) -> bool {
        matches!(self, CatalogKind::Sites | CatalogKind::LivePrices)
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A geographic region: level 1 is suburb, higher levels are coarser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionSelector {
    pub level: u32,
    pub id: u32,
}

impl Default for RegionSelector {
    /// Level 3, id 1: the whole-of-state region of the Queensland API.
    fn default() -> Self {
        Self { level: 3, id: 1 }
    }
}

/// Abstraction over the live price API.
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    /// Returns the raw JSON body of one catalog listing.
    async fn fetch_catalog(
        &self,
        kind: CatalogKind,
        country_id: u32,
        region: Option<RegionSelector>,
    ) -> Result<serde_json::Value>;
}
