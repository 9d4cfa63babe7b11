// Utility helpers for parsing, dates, basic statistics and rounding.
//
// Everything that has to be forgiving about input lives here so the rest of
// the code can assume clean, typed values.
use chrono::{Datelike, NaiveDate};
use num_format::{Locale, ToFormattedString};
use serde::ser::SerializeMap;
use serde::Serializer;
use std::collections::BTreeMap;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports (commas, spaces, text).
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(",", "");
    s.parse::<f64>().ok()
}

pub fn non_empty(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Same calendar day `years` years earlier. Feb 29 falls back to Feb 28
/// when the target year is not a leap year.
pub fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    let year = date.year() - years as i32;
    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .unwrap_or(date)
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn ser_round2<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round2(*v))
}

pub fn ser_round2_opt<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(v) => s.serialize_some(&round2(*v)),
        None => s.serialize_none(),
    }
}

pub fn ser_round2_map<S: Serializer>(m: &BTreeMap<i32, f64>, s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(m.len()))?;
    for (k, v) in m {
        map.serialize_entry(k, &round2(*v))?;
    }
    map.end()
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for counts in console messages
    // (e.g., `9,855 records`).
    n.to_formatted_string(&Locale::en)
}
