pub mod fuelprices;
pub mod opendata;
