//! Schema profiles: how one upstream export maps onto the canonical record.
//!
//! The price denomination is not self-describing in any upstream payload.
//! Exports of the same nominal API have used hundredths and thousandths of a
//! dollar for the same magnitude, so the conversion factor is pinned per
//! profile and must be re-checked whenever a new export is integrated.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::error::{FuelError, Result};

pub const QLD_OPEN_DATA_CHANGES: &str = "qld-open-data-changes";
pub const QLD_OPEN_DATA_LEGACY: &str = "qld-open-data-legacy";
pub const QLD_LIVE_API: &str = "qld-live-api";

/// Timestamp layouts seen across the open-data exports and the live API.
/// Naive layouts are read as UTC.
const DEFAULT_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

/// Target fields of the canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    SiteId,
    SiteName,
    Brand,
    Address,
    Suburb,
    State,
    Postcode,
    Latitude,
    Longitude,
    FuelType,
    Price,
    TransactionTime,
}

impl CanonicalField {
    /// Fields without which a row is excluded.
    pub const REQUIRED: [CanonicalField; 3] = [
        CanonicalField::SiteId,
        CanonicalField::FuelType,
        CanonicalField::Price,
    ];
}

/// Versioned description of one upstream source or export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaProfile {
    pub name: String,
    pub version: u32,
    /// Upstream column name to canonical field.
    pub columns: BTreeMap<String, CanonicalField>,
    /// How many upstream minor units make one dollar (100 or 1000 so far).
    pub minor_units_per_dollar: f64,
    /// `chrono` layouts tried in order after RFC 3339.
    #[serde(default = "default_timestamp_formats")]
    pub timestamp_formats: Vec<String>,
}

fn default_timestamp_formats() -> Vec<String> {
    DEFAULT_TIMESTAMP_FORMATS
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn open_data_columns() -> BTreeMap<String, CanonicalField> {
    use CanonicalField::*;
    [
        ("SiteId", SiteId),
        ("Site_Name", SiteName),
        ("Site_Brand", Brand),
        ("Sites_Address_Line_1", Address),
        ("Site_Suburb", Suburb),
        ("Site_State", State),
        ("Site_Post_Code", Postcode),
        ("Site_Latitude", Latitude),
        ("Site_Longitude", Longitude),
        ("Fuel_Type", FuelType),
        ("Price", Price),
        ("TransactionDateutc", TransactionTime),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn live_api_columns() -> BTreeMap<String, CanonicalField> {
    use CanonicalField::*;
    [
        ("SiteId", SiteId),
        ("SiteName", SiteName),
        ("Brand", Brand),
        ("Address", Address),
        ("Suburb", Suburb),
        ("Postcode", Postcode),
        ("Lat", Latitude),
        ("Lng", Longitude),
        ("FuelType", FuelType),
        ("Price", Price),
        ("TransactionDateUtc", TransactionTime),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl SchemaProfile {
    /// Monthly "changes only" CSV export, 2025 onward: tenths of a cent.
    pub fn qld_open_data_changes() -> Self {
        Self {
            name: QLD_OPEN_DATA_CHANGES.to_string(),
            version: 1,
            columns: open_data_columns(),
            minor_units_per_dollar: 1000.0,
            timestamp_formats: default_timestamp_formats(),
        }
    }

    /// 2024 monthly CSV export: cents.
    pub fn qld_open_data_legacy() -> Self {
        Self {
            name: QLD_OPEN_DATA_LEGACY.to_string(),
            version: 1,
            columns: open_data_columns(),
            minor_units_per_dollar: 100.0,
            timestamp_formats: default_timestamp_formats(),
        }
    }

    /// Flattened live `GetSitesPrices` payload: tenths of a cent.
    pub fn qld_live_api() -> Self {
        Self {
            name: QLD_LIVE_API.to_string(),
            version: 1,
            columns: live_api_columns(),
            minor_units_per_dollar: 1000.0,
            timestamp_formats: default_timestamp_formats(),
        }
    }

    /// Rejects profiles that could only produce garbage prices.
    pub fn validate(&self) -> Result<()> {
        if !self.minor_units_per_dollar.is_finite() || self.minor_units_per_dollar <= 0.0 {
            return Err(FuelError::Config(format!(
                "profile '{}' has invalid conversion factor {}",
                self.name, self.minor_units_per_dollar
            )));
        }
        for field in CanonicalField::REQUIRED {
            if self.upstream_columns(field).is_empty() {
                return Err(FuelError::Config(format!(
                    "profile '{}' maps no column to required field {field:?}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Upstream column names mapped onto `field`.
    pub fn upstream_columns(&self, field: CanonicalField) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, f)| **f == field)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    pub fn to_dollars(&self, minor_units: f64) -> f64 {
        minor_units / self.minor_units_per_dollar
    }

    /// Parses a timestamp using RFC 3339 first, then each configured layout.
    pub fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Some(t.with_timezone(&Utc));
        }
        self.timestamp_formats
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

/// Named profiles available to the pipeline.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<String, SchemaProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileRegistry {
    pub fn builtin() -> Self {
        let profiles = [
            SchemaProfile::qld_open_data_changes(),
            SchemaProfile::qld_open_data_legacy(),
            SchemaProfile::qld_live_api(),
        ]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();
        Self { profiles }
    }

    /// Loads extra profiles from a JSON array on disk. A loaded profile
    /// replaces a built-in one with the same name.
    pub fn load_into(&mut self, path: &str) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.merge_json(&content)?;
        info!(path, total = self.profiles.len(), "Schema profiles loaded");
        Ok(())
    }

    pub fn merge_json(&mut self, content: &str) -> Result<()> {
        let loaded: Vec<SchemaProfile> = serde_json::from_str(content)
            .map_err(|e| FuelError::Config(format!("invalid profile file: {e}")))?;
        for profile in loaded {
            profile.validate()?;
            debug!(profile = %profile.name, version = profile.version, "Registering profile");
            self.profiles.insert(profile.name.clone(), profile);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&SchemaProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| FuelError::Config(format!("unknown schema profile '{name}'")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builtin_profiles_validate() {
        let registry = ProfileRegistry::builtin();
        for name in registry.names() {
            registry.get(name).unwrap().validate().unwrap();
        }
        assert_eq!(registry.names().len(), 3);
    }

    #[test]
    fn test_factor_differs_between_exports() {
        assert_eq!(SchemaProfile::qld_open_data_changes().to_dollars(1940.0), 1.94);
        assert_eq!(SchemaProfile::qld_open_data_legacy().to_dollars(1940.0), 19.4);
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let profile = SchemaProfile::qld_open_data_changes();
        let expected = Utc.with_ymd_and_hms(2025, 1, 6, 23, 15, 0).unwrap();

        assert_eq!(profile.parse_timestamp("2025-01-06T23:15:00Z"), Some(expected));
        assert_eq!(profile.parse_timestamp("2025-01-06T23:15:00"), Some(expected));
        assert_eq!(profile.parse_timestamp("2025-01-06 23:15:00"), Some(expected));
        assert_eq!(profile.parse_timestamp("06/01/2025 23:15"), Some(expected));
        assert_eq!(profile.parse_timestamp("not a date"), None);
        assert_eq!(profile.parse_timestamp(""), None);
    }

    #[test]
    fn test_merge_json_overrides_and_validates() {
        let mut registry = ProfileRegistry::builtin();
        let json = r#"[{
            "name": "custom",
            "version": 2,
            "columns": {"id": "site_id", "fuel": "fuel_type", "cents": "price"},
            "minor_units_per_dollar": 100.0
        }]"#;
        registry.merge_json(json).unwrap();
        let custom = registry.get("custom").unwrap();
        assert_eq!(custom.version, 2);
        assert_eq!(custom.timestamp_formats.len(), DEFAULT_TIMESTAMP_FORMATS.len());

        let bad = r#"[{"name": "zero", "version": 1, "columns": {"id": "site_id"}, "minor_units_per_dollar": 0.0}]"#;
        assert!(matches!(registry.merge_json(bad), Err(FuelError::Config(_))));
    }

    #[test]
    fn test_unknown_profile_is_config_error() {
        let registry = ProfileRegistry::builtin();
        assert!(matches!(registry.get("nope"), Err(FuelError::Config(_))));
    }
}
