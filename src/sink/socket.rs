// src/sink/socket.rs
//! Sink that streams readings to a websocket client as JSON text messages

use super::ReadingSink;
use crate::{
    error::{RelayError, Result},
    gps::Reading,
};
use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use std::fmt::Display;
use tokio::sync::Mutex;

/// Writes each reading as one text message on the wrapped sink, normally
/// the sending half of an upgraded websocket.
pub struct SocketSink<S> {
    sink: Mutex<S>,
}

impl<S> SocketSink<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Send a close frame to the client
    pub async fn close(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Close(None))
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to close websocket: {}", e)))
    }
}

#[async_trait]
impl<S> ReadingSink for SocketSink<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    async fn write(&self, reading: &Reading) -> Result<()> {
        let json = serde_json::to_string(reading)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to write to websocket: {}", e)))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}
