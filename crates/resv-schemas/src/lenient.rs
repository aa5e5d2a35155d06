//! Lenient field decoding for stored documents.
//!
//! Records written by older clients may carry amounts as strings, floats,
//! negatives or nulls. Anything that is not a finite number `>= 0` decodes as
//! `0`; fractional amounts truncate. These helpers are only used on the read
//! path. New input is validated strictly before it is written.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::LineItem;

/// Clamp an arbitrary JSON value to a non-negative whole amount.
pub fn amount_from_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(u) => u,
            None => n.as_f64().map(clamp_f64).unwrap_or(0),
        },
        Value::String(s) => s.trim().parse::<f64>().map(clamp_f64).unwrap_or(0),
        _ => 0,
    }
}

fn clamp_f64(f: f64) -> u64 {
    if f.is_finite() && f >= 0.0 {
        f.trunc() as u64
    } else {
        0
    }
}

/// A stored minute offset, or `None` when absent or unusable.
pub fn minutes_from_value(value: &Value) -> Option<u32> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if f.is_finite() && (0.0..1440.0).contains(&f) {
        Some(f.trunc() as u32)
    } else {
        None
    }
}

pub fn string_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// serde adapters (`deserialize_with`)
// ---------------------------------------------------------------------------

pub fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(amount_from_value(&v))
}

pub fn opt_minutes<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(minutes_from_value(&v))
}

pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(string_from_value(&v))
}

pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(opt_string(d)?.unwrap_or_default())
}

pub fn opt_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(v.as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
}

pub fn opt_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(v.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc)))
}

/// Line items that fail to decode are dropped rather than failing the record.
pub fn items<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<LineItem>, D::Error> {
    let v = Value::deserialize(d)?;
    let Value::Array(rows) = v else {
        return Ok(Vec::new());
    };
    Ok(rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<LineItem>(row).ok())
        .filter(|item| !item.name.trim().is_empty())
        .collect())
}
