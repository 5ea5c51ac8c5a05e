use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health of the live price API as seen from this host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiStatus {
    pub timestamp: DateTime<Utc>,
    /// `None` when `/Version` could not be read.
    pub api_version: Option<String>,
    pub base_url: String,
    pub endpoints: Vec<&'static str>,
    /// `"OK"`, or `"ERROR: <reason>"` when the version request failed.
    pub connectivity: String,
}

impl ApiStatus {
    pub fn is_ok(&self) -> bool {
        self.api_version.is_some()
    }
}
