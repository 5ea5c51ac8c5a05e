//! Runtime settings read from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FuelError, Result};
use crate::profile::ProfileRegistry;
use crate::services::RegionSelector;

pub const DEFAULT_BASE_URL: &str = "https://fppdirectapi-prod.fuelpricesqld.com.au";
pub const DEFAULT_COUNTRY_ID: u32 = 21;
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Subscriber token for the live API. Only live commands need it.
    pub api_token: Option<String>,
    pub base_url: String,
    pub country_id: u32,
    pub default_region: RegionSelector,
    pub catalog_ttl: Duration,
    pub snapshot_ttl: Duration,
    /// JSON map of `"YYYY-MM"` periods to export downloads.
    pub datasets_path: Option<PathBuf>,
    /// JSON list of extra schema profiles.
    pub profiles_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            country_id: DEFAULT_COUNTRY_ID,
            default_region: RegionSelector::default(),
            catalog_ttl: DEFAULT_CATALOG_TTL,
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            datasets_path: None,
            profiles_path: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable source. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            api_token: var("FUELPRICES_API_TOKEN"),
            base_url: var("FUELPRICES_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            country_id: parse_var("FUELPRICES_COUNTRY_ID", var("FUELPRICES_COUNTRY_ID"))?
                .unwrap_or(defaults.country_id),
            default_region: defaults.default_region,
            catalog_ttl: parse_var("FUELPRICES_CATALOG_TTL_SECS", var("FUELPRICES_CATALOG_TTL_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.catalog_ttl),
            snapshot_ttl: parse_var(
                "FUELPRICES_SNAPSHOT_TTL_SECS",
                var("FUELPRICES_SNAPSHOT_TTL_SECS"),
            )?
            .map(Duration::from_secs)
            .unwrap_or(defaults.snapshot_ttl),
            datasets_path: var("FUELPRICES_DATASETS").map(PathBuf::from),
            profiles_path: var("FUELPRICES_PROFILES").map(PathBuf::from),
        })
    }

    /// The API token, or a configuration error naming the missing variable.
    pub fn require_api_token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| FuelError::Config("FUELPRICES_API_TOKEN must be set".into()))
    }

    /// Built-in profiles plus any loaded from `profiles_path`.
    pub fn profile_registry(&self) -> Result<ProfileRegistry> {
        let mut registry = ProfileRegistry::builtin();
        if let Some(path) = &self.profiles_path {
            registry.load_into(&path.to_string_lossy())?;
        }
        Ok(registry)
    }
}

fn parse_var<T>(name: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value
            .parse()
            .map_err(|e| FuelError::Config(format!("{name}='{value}': {e}")))
    })
    .transpose()
}
