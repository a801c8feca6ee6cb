// src/config.rs
//! Configuration management with file storage

use crate::{
    error::{RelayError, Result},
    publisher::PublisherConfig,
};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_host: String,
    pub http_port: u16,
    pub web_file: Option<PathBuf>, // page served on /map
    pub serial_port: Option<String>,
    pub serial_baudrate: u32,
    pub server_url: String, // where `forward` posts sentences
    pub publisher_buffer: usize,
    pub receiver_buffer: usize,
    pub delivery_timeout_ms: u64,
    pub forward_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            http_port: 8000,
            web_file: None,
            serial_port: None,
            serial_baudrate: 9600,
            server_url: "http://localhost:8000".to_string(),
            publisher_buffer: 100,
            receiver_buffer: 10,
            delivery_timeout_ms: 5000,
            forward_timeout_ms: 3000,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Other(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| RelayError::Other(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::Other(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| RelayError::Other(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| RelayError::Other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| RelayError::Other("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("gps-relay").join("config.json"))
    }

    /// Address the HTTP server listens on
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_host, self.http_port)
            .parse()
            .map_err(|e| RelayError::Other(format!("Invalid bind address: {}", e)))
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            inbound_capacity: self.publisher_buffer,
            subscriber_capacity: self.receiver_buffer,
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
        }
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.serial_port = Some(port);
        self.serial_baudrate = baudrate;
    }
}
