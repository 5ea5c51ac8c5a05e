use serde::Deserialize;
use std::collections::BTreeMap;

use fuel_prices::error::{FuelError, Result};
use fuel_prices::profile::{QLD_OPEN_DATA_CHANGES, QLD_OPEN_DATA_LEGACY};

/// Where one month's export lives and how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub url: String,
    pub profile: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetEntry {
    Url(String),
    Full { url: String, profile: Option<String> },
}

/// Maps `"YYYY-MM"` periods to export downloads.
///
/// Stored as a JSON object on disk. An entry is either a bare URL, whose
/// profile is inferred from the year, or an object naming the profile:
/// ```json
/// {
///   "2025-01": "https://www.data.qld.gov.au/.../fuel-prices-2025-01-changes-only.csv",
///   "2024-06": { "url": "https://...", "profile": "qld-open-data-legacy" }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    entries: BTreeMap<(i32, u32), Dataset>,
}

impl DatasetCatalog {
    /// The periods published on the Queensland open data portal.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            (2025, 1),
            Dataset {
                url: "https://www.data.qld.gov.au/dataset/7c07fdce-a5f0-4de0-8213-b8a31575a26d/resource/3d3676f9-9ead-46cb-878b-e5c26f4b14d2/download/fuel-prices-2025-01-changes-only.csv".into(),
                profile: QLD_OPEN_DATA_CHANGES.into(),
            },
        );
        entries.insert(
            (2024, 6),
            Dataset {
                url: "https://www.data.qld.gov.au/dataset/c59ba00b-8d2b-4a61-896c-889e0b926d22/resource/dab7eb50-e789-4be5-a9ad-bacc35d6d50d/download/fuel-prices-june-2024.csv".into(),
                profile: QLD_OPEN_DATA_LEGACY.into(),
            },
        );
        Self { entries }
    }

    /// Loads the map from a JSON file at `path` on top of the built-in one.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut catalog = Self::builtin();
        catalog.merge_json(&content)?;
        Ok(catalog)
    }

    pub fn merge_json(&mut self, content: &str) -> Result<()> {
        let raw: BTreeMap<String, DatasetEntry> = serde_json::from_str(content)
            .map_err(|e| FuelError::Config(format!("invalid dataset map: {e}")))?;

        for (period, entry) in raw {
            let (year, month) = parse_period(&period)?;
            let dataset = match entry {
                DatasetEntry::Url(url) => Dataset {
                    url,
                    profile: default_profile(year).into(),
                },
                DatasetEntry::Full { url, profile } => Dataset {
                    url,
                    profile: profile.unwrap_or_else(|| default_profile(year).into()),
                },
            };
            self.entries.insert((year, month), dataset);
        }
        Ok(())
    }

    pub fn get(&self, year: i32, month: u32) -> Option<&Dataset> {
        self.entries.get(&(year, month))
    }

    /// Iterates over all `("YYYY-MM", dataset)` pairs in period order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &Dataset)> {
        self.entries
            .iter()
            .map(|((y, m), d)| (format!("{y}-{m:02}"), d))
    }
}

/// 2024 exports price in cents, later ones in tenths of a cent.
fn default_profile(year: i32) -> &'static str {
    if year < 2025 {
        QLD_OPEN_DATA_LEGACY
    } else {
        QLD_OPEN_DATA_CHANGES
    }
}

fn parse_period(period: &str) -> Result<(i32, u32)> {
    let invalid = || FuelError::Config(format!("dataset period '{period}' is not YYYY-MM"));
    let (year, month) = period.split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_periods() {
        let catalog = DatasetCatalog::builtin();
        assert_eq!(catalog.get(2025, 1).unwrap().profile, QLD_OPEN_DATA_CHANGES);
        assert_eq!(catalog.get(2024, 6).unwrap().profile, QLD_OPEN_DATA_LEGACY);
        assert!(catalog.get(2025, 2).is_none());
        let periods: Vec<_> = catalog.iter().map(|(p, _)| p).collect();
        assert_eq!(periods, ["2024-06", "2025-01"]);
    }

    #[test]
    fn test_merge_bare_and_full_entries() {
        let mut catalog = DatasetCatalog::builtin();
        catalog
            .merge_json(
                r#"{
                    "2025-02": "https://example.org/feb.csv",
                    "2024-07": "https://example.org/jul.csv",
                    "2025-03": {"url": "https://example.org/mar.csv", "profile": "custom"}
                }"#,
            )
            .unwrap();

        assert_eq!(catalog.get(2025, 2).unwrap().profile, QLD_OPEN_DATA_CHANGES);
        assert_eq!(catalog.get(2024, 7).unwrap().profile, QLD_OPEN_DATA_LEGACY);
        assert_eq!(catalog.get(2025, 3).unwrap().profile, "custom");
        assert!(catalog.get(2025, 1).is_some());
    }

    #[test]
    fn test_bad_period_is_rejected() {
        let mut catalog = DatasetCatalog::default();
        for bad in [r#"{"2025":"u"}"#, r#"{"2025-13":"u"}"#, r#"{"jan-01":"u"}"#] {
            assert!(matches!(catalog.merge_json(bad), Err(FuelError::Config(_))));
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets.json");
        std::fs::write(&path, r#"{"2025-04": "https://example.org/apr.csv"}"#).unwrap();

        let catalog = DatasetCatalog::load(path.to_str().unwrap()).unwrap();
        assert_eq!(catalog.get(2025, 4).unwrap().url, "https://example.org/apr.csv");
    }
}
