// src/gps/coord.rs
//! Conversion of receiver coordinates (DDMM.MMMM) into signed decimal degrees

use crate::error::ParseError;
use std::{fmt, str::FromStr};

/// Coordinates are quantised to multiples of this many degrees.
const UNIT: f64 = 0.0000005;

/// Compass hemisphere that follows a coordinate in an RMC sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    East,
    South,
    West,
}

impl Hemisphere {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Hemisphere::North),
            'E' => Some(Hemisphere::East),
            'S' => Some(Hemisphere::South),
            'W' => Some(Hemisphere::West),
            _ => None,
        }
    }

    /// South and West are negative
    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::North | Hemisphere::East => 1.0,
            Hemisphere::South | Hemisphere::West => -1.0,
        }
    }
}

impl FromStr for Hemisphere {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Hemisphere::from_char(c).ok_or(ParseError::BadCoordinateFormat),
            _ => Err(ParseError::BadCoordinateFormat),
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Hemisphere::North => 'N',
            Hemisphere::East => 'E',
            Hemisphere::South => 'S',
            Hemisphere::West => 'W',
        };
        write!(f, "{}", c)
    }
}

/// Round half-up to the nearest multiple of `UNIT`. Inputs are never negative.
fn round_to_unit(x: f64) -> f64 {
    ((x / UNIT + 0.5) as i64) as f64 * UNIT
}

fn parse_number(raw: &str) -> Result<f64, ParseError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::MalformedNumber(raw.to_string())),
    }
}

/// Pin the value to exactly six decimal places by printing and re-reading it.
fn normalize(x: f64) -> Result<f64, ParseError> {
    let text = format!("{:.6}", x);
    text.parse::<f64>()
        .map_err(|_| ParseError::MalformedNumber(text))
}

/// Convert a `DDMM.MMMM` / `DDDMM.MMMM` coordinate into signed decimal degrees.
///
/// The last two integer digits and the fraction are minutes, everything in
/// front of them is whole degrees. A value with two or fewer integer digits
/// has no degree part to split off and is taken as decimal degrees already.
///
/// Minutes are converted and rounded to the quantisation unit before the
/// degrees are added, and the sum is rounded again. Both steps matter for
/// reproducing known readings bit for bit.
pub fn convert(coordinate: &str, hemisphere: Hemisphere) -> Result<f64, ParseError> {
    let integer_len = coordinate.find('.').unwrap_or(coordinate.len());

    let magnitude = if integer_len > 2 {
        let split = integer_len - 2;
        let (degree_str, minute_str) = match (coordinate.get(..split), coordinate.get(split..)) {
            (Some(d), Some(m)) => (d, m),
            _ => return Err(ParseError::MalformedNumber(coordinate.to_string())),
        };
        let minutes = parse_number(minute_str)?;
        let degrees = parse_number(degree_str)?;
        round_to_unit(degrees + round_to_unit(minutes / 60.0))
    } else {
        round_to_unit(parse_number(coordinate)?)
    };

    Ok(hemisphere.sign() * normalize(magnitude)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_southern_latitude() {
        let result = convert("5125.0399", Hemisphere::South).unwrap();
        assert_eq!(result, -51.417331);
    }

    #[test]
    fn test_northern_latitude_keeps_sign() {
        let result = convert("5125.0399", Hemisphere::North).unwrap();
        assert_eq!(result, 51.417331);
    }

    #[test]
    fn test_zero_padded_longitude() {
        let result = convert("00017.0901", Hemisphere::West).unwrap();
        assert_eq!(result, -0.284835);
    }

    #[test]
    fn test_short_value_is_already_decimal() {
        let result = convert("17.0901", "W".parse().unwrap()).unwrap();
        assert_eq!(result, -17.0901);
    }

    #[test]
    fn test_three_digit_degrees() {
        let result = convert("12345.6789", Hemisphere::East).unwrap();
        assert!((result - 123.761315).abs() < 1e-9, "got {}", result);
    }

    #[test]
    fn test_reformatting_is_idempotent() {
        for (coord, hemi) in [
            ("5125.0399", Hemisphere::South),
            ("00017.0901", Hemisphere::West),
            ("4807.038", Hemisphere::North),
            ("01131.000", Hemisphere::East),
        ] {
            let value = convert(coord, hemi).unwrap();
            let reparsed: f64 = format!("{:.6}", value).parse().unwrap();
            assert_eq!(value, reparsed, "{} {}", coord, hemi);
        }
    }

    #[test]
    fn test_not_a_number() {
        let result = convert("Not a number", Hemisphere::East);
        assert!(matches!(result, Err(ParseError::MalformedNumber(_))));
    }

    #[test]
    fn test_bad_minutes() {
        let result = convert("51xx.0399", Hemisphere::North);
        assert!(matches!(result, Err(ParseError::MalformedNumber(_))));
    }

    #[test]
    fn test_hemisphere_from_str() {
        assert_eq!("N".parse::<Hemisphere>(), Ok(Hemisphere::North));
        assert_eq!("W".parse::<Hemisphere>(), Ok(Hemisphere::West));
        assert_eq!("X".parse::<Hemisphere>(), Err(ParseError::BadCoordinateFormat));
        assert_eq!("NS".parse::<Hemisphere>(), Err(ParseError::BadCoordinateFormat));
        assert_eq!(Hemisphere::South.to_string(), "S");
    }
}
