// src/sink/mod.rs
//! Subscribers that consume published readings

pub mod latest;
pub mod log;
pub mod socket;

use crate::{error::Result, gps::Reading};
use async_trait::async_trait;

pub use latest::LatestReading;
pub use log::LogSink;
pub use socket::SocketSink;

/// Anything that can accept readings from the publisher.
///
/// Implementations may log the reading, push it over a websocket, or store
/// it. A returned error is logged by the publisher and delivery carries on
/// with the next reading.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn write(&self, reading: &Reading) -> Result<()>;

    /// Short label used in log output
    fn name(&self) -> &str {
        "sink"
    }
}
