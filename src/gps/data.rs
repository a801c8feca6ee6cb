// src/gps/data.rs
//! GPS reading structure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GPS reports speed over ground in knots; readings carry km/h.
pub const KNOT_RATIO: f64 = 1.852001;

/// One parsed position fix.
///
/// Only the sentence parser builds these, and only from a sentence that
/// carried a valid fix, so `active` is always true on a published reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub active: bool,
    pub speed: f64,   // km/h
    pub bearing: f64, // degrees
}

impl Reading {
    /// Speed converted back to knots, as the receiver reported it
    pub fn speed_knots(&self) -> f64 {
        self.speed / KNOT_RATIO
    }

    /// Format the position for log output
    pub fn format_position(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}
