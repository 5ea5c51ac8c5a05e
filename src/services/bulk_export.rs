//! Trait and types for the periodically published bulk CSV export.

use crate::error::Result;

/// Result of asking for one month's export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Raw CSV body plus the name of the schema profile that export uses.
    Downloaded { body: Vec<u8>, profile: String },
    /// Nothing is published for the requested period.
    NoDataset,
}

/// Abstraction over the open-data portal hosting monthly exports.
#[async_trait::async_trait]
pub trait BulkExportSource: Send + Sync {
    async fn fetch_bulk_export(&self, year: i32, month: u32) -> Result<ExportOutcome>;
}
