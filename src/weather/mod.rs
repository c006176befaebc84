pub mod backfill;
pub mod client;
pub mod error;
pub mod locate_station;
pub mod sample;
