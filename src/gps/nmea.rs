// src/gps/nmea.rs
//! RMC sentence parsing
//!
//! Fields are located by shape rather than by comma position, so stray
//! whitespace or empty fields between them do not break the parse. Each
//! stage strips what it matched before the next stage searches, so a date
//! is never mistaken for a coordinate and a coordinate never for a speed.

use super::{
    coord::{self, Hemisphere},
    data::{Reading, KNOT_RATIO},
};
use crate::error::ParseError;
use chrono::NaiveDateTime;
use std::ops::Range;

/// `ddmmyy` followed by `hhmmss`
const TIMESTAMP_LAYOUT: &str = "%d%m%y%H%M%S";
const FIX_MARKER: &str = "A,";

/// Check whether a framed line is a Recommended Minimum (RMC) sentence
pub fn is_rmc(line: &str) -> bool {
    line.split(',')
        .next()
        .map(|header| header.trim_start_matches('$').ends_with("RMC"))
        .unwrap_or(false)
}

/// Parse one RMC sentence into a fully populated reading
pub fn parse_rmc(sentence: &str) -> Result<Reading, ParseError> {
    let text: Vec<char> = sentence.chars().collect();

    // Timestamp: the first six-digit run is the time of day, the second the date
    let stamps = find_six_digit_runs(&text);
    if stamps.len() != 2 {
        return Err(ParseError::TimestampUnparseable);
    }
    let time: String = text[stamps[0].clone()].iter().collect();
    let date: String = text[stamps[1].clone()].iter().collect();
    let timestamp = NaiveDateTime::parse_from_str(&format!("{}{}", date, time), TIMESTAMP_LAYOUT)
        .map_err(|_| ParseError::TimestampUnparseable)?
        .and_utc();
    let text = remove_spans(&text, &stamps);

    // Fix validity
    let working: String = text.iter().collect();
    if !working.contains(FIX_MARKER) {
        return Err(ParseError::NoFix);
    }

    // Coordinates: latitude first, longitude second
    let coords = find_coordinates(&text);
    if coords.len() != 2 {
        return Err(ParseError::BadCoordinateFormat);
    }
    let latitude = coord::convert(&coords[0].value, coords[0].hemisphere)?;
    let longitude = coord::convert(&coords[1].value, coords[1].hemisphere)?;
    let spans: Vec<Range<usize>> = coords.iter().map(|c| c.span.clone()).collect();
    let text = remove_spans(&text, &spans);

    // Velocity: speed in knots, then bearing
    let decimals = find_decimals(&text);
    if decimals.len() != 2 {
        return Err(ParseError::VelocityUnparseable);
    }
    let knots = parse_decimal(&text[decimals[0].clone()])?;
    let bearing = parse_decimal(&text[decimals[1].clone()])?;

    Ok(Reading {
        latitude,
        longitude,
        timestamp,
        active: true,
        speed: knots * KNOT_RATIO,
        bearing,
    })
}

/// A `<digits><any><digits><any><hemisphere>` match
#[derive(Debug)]
struct CoordinateMatch {
    span: Range<usize>,
    value: String,
    hemisphere: Hemisphere,
}

fn digit_run_len(text: &[char], start: usize) -> usize {
    text.get(start..)
        .map(|rest| rest.iter().take_while(|c| c.is_ascii_digit()).count())
        .unwrap_or(0)
}

/// Non-overlapping runs of exactly six digits, scanning left to right.
/// A twelve digit run counts as two.
fn find_six_digit_runs(text: &[char]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i + 6 <= text.len() {
        if text[i..i + 6].iter().all(|c| c.is_ascii_digit()) {
            runs.push(i..i + 6);
            i += 6;
        } else {
            i += 1;
        }
    }
    runs
}

fn find_coordinates(text: &[char]) -> Vec<CoordinateMatch> {
    let mut found = Vec::new();
    let mut i = 0;
    while i < text.len() {
        match match_coordinate(text, i) {
            Some(m) => {
                i = m.span.end;
                found.push(m);
            }
            None => i += 1,
        }
    }
    found
}

/// Longest digit runs are tried first, falling back to shorter ones so that
/// a digit can serve as the separator when nothing else fits.
fn match_coordinate(text: &[char], start: usize) -> Option<CoordinateMatch> {
    let is_any = |i: usize| text.get(i).is_some_and(|c| *c != '\n');

    for whole in (1..=digit_run_len(text, start)).rev() {
        let sep = start + whole;
        if !is_any(sep) {
            continue;
        }
        let frac_start = sep + 1;
        for frac in (1..=digit_run_len(text, frac_start)).rev() {
            let hemi_sep = frac_start + frac;
            if !is_any(hemi_sep) {
                continue;
            }
            let hemisphere = text.get(hemi_sep + 1).copied().and_then(Hemisphere::from_char);
            if let Some(hemisphere) = hemisphere {
                return Some(CoordinateMatch {
                    span: start..hemi_sep + 2,
                    value: text[start..hemi_sep].iter().collect(),
                    hemisphere,
                });
            }
        }
    }
    None
}

/// Non-overlapping `<digits>.<digits>` numbers
fn find_decimals(text: &[char]) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    let mut i = 0;
    while i < text.len() {
        let whole = digit_run_len(text, i);
        let dot = i + whole;
        if whole > 0 && text.get(dot) == Some(&'.') {
            let frac = digit_run_len(text, dot + 1);
            if frac > 0 {
                found.push(i..dot + 1 + frac);
                i = dot + 1 + frac;
                continue;
            }
        }
        i += 1;
    }
    found
}

fn parse_decimal(chars: &[char]) -> Result<f64, ParseError> {
    let raw: String = chars.iter().collect();
    raw.parse::<f64>()
        .map_err(|_| ParseError::MalformedNumber(raw))
}

fn remove_spans(text: &[char], spans: &[Range<usize>]) -> Vec<char> {
    text.iter()
        .enumerate()
        .filter(|(i, _)| !spans.iter().any(|span| span.contains(i)))
        .map(|(_, c)| *c)
        .collect()
}
