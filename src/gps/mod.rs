// src/gps/mod.rs
//! GPS sentence handling and parsing

pub mod coord;
pub mod data;
pub mod nmea;
pub mod serial;

pub use data::Reading;
pub use nmea::{is_rmc, parse_rmc};
