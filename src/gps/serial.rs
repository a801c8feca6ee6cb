// src/gps/serial.rs
//! Serial port access and NMEA line framing

use crate::error::{RelayError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

const START_CHARACTER: u8 = b'$';
const NEWLINE: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

/// Open a GPS device on a serial port
pub fn open_serial(port: &str, baudrate: u32) -> Result<SerialStream> {
    info!(port, baudrate, "opening serial port");
    tokio_serial::new(port, baudrate)
        .timeout(Duration::from_millis(1000))
        .open_native_async()
        .map_err(|e| RelayError::Connection(format!("Failed to open serial port {}: {}", port, e)))
}

/// Splits a byte stream into sentences.
///
/// Bytes are skipped until a `$`, then collected until CR or LF. The marker
/// and terminator are not part of the returned sentence.
pub struct SentenceReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> SentenceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next sentence. `None` once the stream ends.
    pub async fn next_sentence(&mut self) -> Result<Option<String>> {
        // Wait for the start character
        loop {
            match self.next_byte().await? {
                Some(START_CHARACTER) => break,
                Some(_) => continue,
                None => return Ok(None),
            }
        }

        let mut line = Vec::with_capacity(255);
        loop {
            match self.next_byte().await? {
                Some(NEWLINE) | Some(CARRIAGE_RETURN) | None => break,
                Some(byte) => line.push(byte),
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    async fn next_byte(&mut self) -> Result<Option<u8>> {
        match self.reader.read_u8().await {
            Ok(byte) => Ok(Some(byte)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| RelayError::Other(format!("Failed to list serial ports: {}", e)))?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {} - {:?}", port.port_name, port.port_type);
        }
    }

    Ok(())
}
