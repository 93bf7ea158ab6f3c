//! Coerces producer-supplied values to the service's column-typed JSON
//! representation.
//!
//! Producer rows are keyed by column name and carry a [`RawValue`]: a
//! tagged-value enum rather than a runtime-erased container.

use std::collections::HashMap;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jiff::Timestamp;
use jiff::civil::{Date, Time};
use jiff::tz::TimeZone;
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::errors::Error;
use crate::schema::{ColumnSpec, ColumnType, TableSchema};

/// A producer-supplied value prior to normalization.
#[derive(Debug, Clone)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Date(Date),
    Time(Time),
    Timestamp(Timestamp),
    Uuid(Uuid),
    Variant(JsonValue),
}

/// Validates every key against `schema` and normalizes its value. Null
/// omission happens at serialization time, not here.
pub fn normalize_row(
    schema: &TableSchema,
    row: &HashMap<String, RawValue>,
) -> Result<serde_json::Map<String, JsonValue>, Error> {
    let mut out = serde_json::Map::with_capacity(row.len());
    for (key, value) in row {
        let column = schema
            .column(key)
            .ok_or_else(|| Error::SchemaViolation(format!("Column not in schema: {key}")))?;
        out.insert(key.clone(), normalize(column, value)?);
    }
    Ok(out)
}

/// Coerces one value to its column's semantic type.
pub fn normalize(spec: &ColumnSpec, value: &RawValue) -> Result<JsonValue, Error> {
    match spec.column_type {
        ColumnType::Boolean => normalize_boolean(value),
        ColumnType::Number => normalize_number(spec, value),
        ColumnType::Varchar => normalize_varchar(spec, value),
        ColumnType::Binary => normalize_binary(value),
        ColumnType::Variant => normalize_variant(value),
        ColumnType::Date => normalize_date(value),
        ColumnType::Time => normalize_time(spec, value),
        ColumnType::TimestampNtz | ColumnType::TimestampLtz | ColumnType::TimestampTz => {
            normalize_timestamp(spec, value)
        }
    }
}

fn normalize_boolean(value: &RawValue) -> Result<JsonValue, Error> {
    let b = match value {
        RawValue::Null => return Ok(JsonValue::Null),
        RawValue::Bool(b) => *b,
        RawValue::Int(i) => *i != 0,
        RawValue::UInt(u) => *u != 0,
        RawValue::Float(f) => *f != 0.0,
        RawValue::Decimal(d) => !d.is_zero(),
        RawValue::String(s) => parse_bool_str(s)?,
        other => return Err(value_violation("BOOLEAN", other)),
    };
    Ok(JsonValue::Bool(b))
}

fn parse_bool_str(s: &str) -> Result<bool, Error> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Ok(true),
        "false" | "f" | "0" | "no" => Ok(false),
        _ => Err(Error::ValueViolation(format!("cannot parse '{s}' as BOOLEAN"))),
    }
}

fn normalize_number(spec: &ColumnSpec, value: &RawValue) -> Result<JsonValue, Error> {
    if matches!(value, RawValue::Null) {
        return Ok(JsonValue::Null);
    }
    let mut decimal = to_decimal(value)?;
    if let Some(scale) = spec.scale {
        decimal = decimal.round_dp_with_strategy(scale as u32, RoundingStrategy::MidpointAwayFromZero);
    }
    if let Some(precision) = spec.precision {
        let integer_digits = count_integer_digits(&decimal);
        if integer_digits > precision as usize {
            return Err(Error::ValueViolation(format!(
                "NUMBER column {}: {integer_digits} integer digits exceeds precision {precision}",
                spec.name
            )));
        }
    }
    Ok(JsonValue::String(decimal.normalize().to_string()))
}

fn to_decimal(value: &RawValue) -> Result<Decimal, Error> {
    match value {
        RawValue::Int(i) => Ok(Decimal::from(*i)),
        RawValue::UInt(u) => Ok(Decimal::from(*u)),
        RawValue::Float(f) => Decimal::try_from(*f)
            .map_err(|e| Error::ValueViolation(format!("cannot represent {f} as NUMBER: {e}"))),
        RawValue::Decimal(d) => Ok(*d),
        RawValue::String(s) => Decimal::from_str(s.trim())
            .map_err(|e| Error::ValueViolation(format!("cannot parse '{s}' as NUMBER: {e}"))),
        other => Err(value_violation("NUMBER", other)),
    }
}

fn count_integer_digits(d: &Decimal) -> usize {
    d.abs().trunc().to_string().len()
}

fn normalize_varchar(spec: &ColumnSpec, value: &RawValue) -> Result<JsonValue, Error> {
    if matches!(value, RawValue::Null) {
        return Ok(JsonValue::Null);
    }
    let s = match value {
        RawValue::String(s) => s.clone(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Int(i) => i.to_string(),
        RawValue::UInt(u) => u.to_string(),
        RawValue::Float(f) => f.to_string(),
        RawValue::Decimal(d) => d.to_string(),
        RawValue::Date(d) => d.to_string(),
        RawValue::Time(t) => format_fixed_time(*t, 7),
        RawValue::Timestamp(ts) => format_offset_timestamp(*ts),
        RawValue::Uuid(u) => u.to_string(),
        other => return Err(value_violation("VARCHAR", other)),
    };
    if let Some(length) = spec.length {
        let char_count = s.chars().count();
        if char_count > length as usize {
            return Err(Error::ValueViolation(format!(
                "VARCHAR column {}: value length {char_count} exceeds max length {length}",
                spec.name
            )));
        }
    }
    Ok(JsonValue::String(s))
}

fn normalize_binary(value: &RawValue) -> Result<JsonValue, Error> {
    if matches!(value, RawValue::Null) {
        return Ok(JsonValue::Null);
    }
    let bytes = match value {
        RawValue::Bytes(b) => b.clone(),
        RawValue::String(s) => decode_hex(s)?,
        other => return Err(value_violation("BINARY", other)),
    };
    Ok(JsonValue::String(STANDARD.encode(bytes)))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, Error> {
    let trimmed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if trimmed.is_empty() || trimmed.len() % 2 != 0 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::ValueViolation(format!("'{s}' is not valid hex for BINARY")));
    }
    (0..trimmed.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&trimmed[i..i + 2], 16)
                .map_err(|e| Error::ValueViolation(format!("invalid hex byte in '{s}': {e}")))
        })
        .collect()
}

fn normalize_variant(value: &RawValue) -> Result<JsonValue, Error> {
    match value {
        RawValue::Null => Ok(JsonValue::Null),
        RawValue::Variant(v) => normalize_variant_json(v.clone()),
        RawValue::String(s) => match serde_json::from_str::<JsonValue>(s) {
            Ok(parsed) => normalize_variant_json(parsed),
            Err(_) => Ok(JsonValue::String(s.clone())),
        },
        RawValue::Bool(b) => Ok(JsonValue::Bool(*b)),
        RawValue::Int(i) => Ok(JsonValue::Number((*i).into())),
        RawValue::UInt(u) => Ok(JsonValue::Number((*u).into())),
        RawValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| Error::ValueViolation("non-finite float in VARIANT".into())),
        RawValue::Decimal(d) => Ok(JsonValue::String(d.to_string())),
        RawValue::Bytes(b) => Ok(JsonValue::String(STANDARD.encode(b))),
        RawValue::Date(d) => Ok(JsonValue::String(d.to_string())),
        RawValue::Time(t) => Ok(JsonValue::String(format_fixed_time(*t, 9))),
        RawValue::Timestamp(ts) => Ok(JsonValue::String(format_zulu_timestamp(*ts, 9))),
        RawValue::Uuid(u) => Ok(JsonValue::String(u.to_string())),
    }
}

fn normalize_variant_json(value: JsonValue) -> Result<JsonValue, Error> {
    match value {
        JsonValue::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, normalize_variant_json(v)?);
            }
            Ok(JsonValue::Object(out))
        }
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(normalize_variant_json(item)?);
            }
            Ok(JsonValue::Array(out))
        }
        scalar => Ok(scalar),
    }
}

fn normalize_date(value: &RawValue) -> Result<JsonValue, Error> {
    if matches!(value, RawValue::Null) {
        return Ok(JsonValue::Null);
    }
    let date = match value {
        RawValue::Date(d) => *d,
        RawValue::Timestamp(ts) => ts.to_zoned(TimeZone::UTC).date(),
        RawValue::String(s) => s
            .parse::<Date>()
            .map_err(|e| Error::ValueViolation(format!("cannot parse '{s}' as DATE: {e}")))?,
        other => return Err(value_violation("DATE", other)),
    };
    Ok(JsonValue::String(date.to_string()))
}

fn normalize_time(spec: &ColumnSpec, value: &RawValue) -> Result<JsonValue, Error> {
    if matches!(value, RawValue::Null) {
        return Ok(JsonValue::Null);
    }
    let time = match value {
        RawValue::Time(t) => *t,
        RawValue::Timestamp(ts) => ts.to_zoned(TimeZone::UTC).time(),
        RawValue::String(s) => s
            .parse::<Time>()
            .map_err(|e| Error::ValueViolation(format!("cannot parse '{s}' as TIME: {e}")))?,
        other => return Err(value_violation("TIME", other)),
    };
    Ok(JsonValue::String(format_fixed_time(time, spec.clamped_timestamp_scale())))
}

fn normalize_timestamp(spec: &ColumnSpec, value: &RawValue) -> Result<JsonValue, Error> {
    if matches!(value, RawValue::Null) {
        return Ok(JsonValue::Null);
    }
    let ts = match value {
        RawValue::Timestamp(ts) => *ts,
        RawValue::Int(i) => Timestamp::from_millisecond(*i)
            .map_err(|e| Error::ValueViolation(format!("invalid millisecond timestamp {i}: {e}")))?,
        RawValue::UInt(u) => Timestamp::from_millisecond(*u as i64)
            .map_err(|e| Error::ValueViolation(format!("invalid millisecond timestamp {u}: {e}")))?,
        RawValue::String(s) => s
            .parse::<Timestamp>()
            .map_err(|e| Error::ValueViolation(format!("cannot parse '{s}' as TIMESTAMP: {e}")))?,
        other => return Err(value_violation("TIMESTAMP", other)),
    };
    Ok(JsonValue::String(format_zulu_timestamp(ts, spec.clamped_timestamp_scale())))
}

/// `HH:mm:ss` plus a fixed-width fractional-second suffix (empty at scale 0).
fn format_fixed_time(t: Time, scale: u8) -> String {
    format!(
        "{:02}:{:02}:{:02}{}",
        t.hour(),
        t.minute(),
        t.second(),
        format_fraction(t.subsec_nanosecond() as u32, scale)
    )
}

fn format_fraction(nanos: u32, scale: u8) -> String {
    if scale == 0 {
        return String::new();
    }
    let scale = scale.min(9);
    let divisor = 10u32.pow(9 - scale as u32);
    format!(".{:0width$}", nanos / divisor, width = scale as usize)
}

/// `.NET`-style `"O"` round-trip format: ISO-8601 date-time with a `+00:00`
/// offset, 7 fractional digits.
fn format_offset_timestamp(ts: Timestamp) -> String {
    let zoned = ts.to_zoned(TimeZone::UTC);
    format!("{}T{}+00:00", zoned.date(), format_fixed_time(zoned.time(), 7))
}

fn format_zulu_timestamp(ts: Timestamp, scale: u8) -> String {
    let zoned = ts.to_zoned(TimeZone::UTC);
    format!("{}T{}Z", zoned.date(), format_fixed_time(zoned.time(), scale))
}

fn value_violation(type_name: &str, value: &RawValue) -> Error {
    Error::ValueViolation(format!("cannot coerce {value:?} to {type_name}"))
}
