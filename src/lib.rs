pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod live;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod services;

pub use error::{FuelError, Result};
