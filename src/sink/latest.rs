// src/sink/latest.rs
//! Sink that remembers the most recent reading

use super::ReadingSink;
use crate::{error::Result, gps::Reading};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

/// Holds the last reading delivered to it. Clones share the same slot.
#[derive(Debug, Default, Clone)]
pub struct LatestReading {
    slot: Arc<RwLock<Option<Reading>>>,
}

impl LatestReading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the latest reading, if any arrived yet
    pub fn get(&self) -> Option<Reading> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReadingSink for LatestReading {
    async fn write(&self, reading: &Reading) -> Result<()> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(reading.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "latest"
    }
}
