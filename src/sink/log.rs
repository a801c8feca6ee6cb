// src/sink/log.rs
//! Sink that writes every reading to the log

use super::ReadingSink;
use crate::{error::Result, gps::Reading};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReadingSink for LogSink {
    async fn write(&self, reading: &Reading) -> Result<()> {
        info!(
            position = %reading.format_position(),
            time = %reading.timestamp,
            speed_kmh = reading.speed,
            bearing = reading.bearing,
            "received reading"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
