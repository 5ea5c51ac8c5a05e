//! Analytics over normalized price tables.
//!
//! Everything here is a pure function of an already-materialized table, so
//! concurrent readers can share one table without locking.

pub mod cheapest;
pub mod trend;
pub mod types;
pub mod utility;

pub use cheapest::cheapest;
pub use trend::{dimensions, filter_records, summarize};
pub use types::{
    DateRange, Dimensions, PriceStats, RankedStation, RecordFilter, TrendOutcome, TrendSummary,
    UNKNOWN_TIME,
};
