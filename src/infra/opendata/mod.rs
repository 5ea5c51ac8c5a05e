//! Monthly CSV exports from the Queensland open data portal.
//!
//! [`DatasetCatalog`] maps periods to download URLs and schema profiles.
//! [`OpenDataClient`] implements the bulk export seam on top of it.

mod client;
mod datasets;

pub use client::OpenDataClient;
pub use datasets::DatasetCatalog;
