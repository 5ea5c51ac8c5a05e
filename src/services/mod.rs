//! Seams to the fetch layer: the core only sees raw payloads through these
//! traits, never the transport behind them.

pub mod bulk_export;
pub mod catalog_api;

pub use bulk_export::{BulkExportSource, ExportOutcome};
pub use catalog_api::{CatalogApi, CatalogKind, RegionSelector};
