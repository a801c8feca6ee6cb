// src/lib.rs
//! GPS Relay Library
//!
//! Parses RMC sentences from a GPS receiver into readings and distributes
//! them to any number of subscribers (log, websocket clients, the latest
//! position endpoint) without a slow subscriber holding up the rest.

pub mod config;
pub mod error;
pub mod forward;
pub mod gps;
pub mod ingest;
pub mod logging;
pub mod publisher;
pub mod server;
pub mod sink;

// Re-export main types for convenience
pub use error::{ParseError, RelayError, Result};
pub use gps::{parse_rmc, Reading};
pub use publisher::{Publisher, PublisherConfig, Subscription};
pub use sink::ReadingSink;
