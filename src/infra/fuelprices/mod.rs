//! Live price API over HTTP.

mod client;
mod status;

pub use client::FuelPriceApiClient;
pub use status::ApiStatus;
