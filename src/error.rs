// src/error.rs
//! Error types for the GPS relay

use std::fmt;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Why a sentence could not be turned into a reading.
///
/// Only the kind is meaningful to callers; the display text is for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TimestampUnparseable,
    /// Well-formed sentence, but the receiver has no position lock yet.
    NoFix,
    BadCoordinateFormat,
    VelocityUnparseable,
    MalformedNumber(String),
}

impl ParseError {
    /// `NoFix` is expected while the receiver warms up and is not a defect.
    pub fn is_no_fix(&self) -> bool {
        matches!(self, ParseError::NoFix)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TimestampUnparseable => write!(f, "could not parse timestamp"),
            ParseError::NoFix => write!(f, "no fix yet"),
            ParseError::BadCoordinateFormat => write!(f, "unexpected coordinate format"),
            ParseError::VelocityUnparseable => write!(f, "could not parse velocity"),
            ParseError::MalformedNumber(raw) => write!(f, "malformed number {:?}", raw),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum RelayError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Parse(ParseError),
    Connection(String),
    Publisher(String),
    Other(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Io(e) => write!(f, "IO error: {}", e),
            RelayError::Serial(e) => write!(f, "Serial error: {}", e),
            RelayError::Json(e) => write!(f, "JSON error: {}", e),
            RelayError::Http(e) => write!(f, "HTTP error: {}", e),
            RelayError::Parse(e) => write!(f, "Parse error: {}", e),
            RelayError::Connection(msg) => write!(f, "Connection error: {}", msg),
            RelayError::Publisher(msg) => write!(f, "Publisher error: {}", msg),
            RelayError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Io(e) => Some(e),
            RelayError::Serial(e) => Some(e),
            RelayError::Json(e) => Some(e),
            RelayError::Http(e) => Some(e),
            RelayError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(error: std::io::Error) -> Self {
        RelayError::Io(error)
    }
}

impl From<tokio_serial::Error> for RelayError {
    fn from(error: tokio_serial::Error) -> Self {
        RelayError::Serial(error)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        RelayError::Json(error)
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        RelayError::Http(error)
    }
}

impl From<ParseError> for RelayError {
    fn from(error: ParseError) -> Self {
        RelayError::Parse(error)
    }
}

impl From<anyhow::Error> for RelayError {
    fn from(error: anyhow::Error) -> Self {
        RelayError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fix_is_distinguished() {
        assert!(ParseError::NoFix.is_no_fix());
        assert!(!ParseError::TimestampUnparseable.is_no_fix());
        assert!(!ParseError::MalformedNumber("x".to_string()).is_no_fix());
    }

    #[test]
    fn test_parse_error_wraps_into_relay_error() {
        let err: RelayError = ParseError::VelocityUnparseable.into();
        assert_eq!(err.to_string(), "Parse error: could not parse velocity");
    }
}
