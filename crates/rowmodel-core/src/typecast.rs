//! Typecasting of assigned values to declared column types.
//!
//! [`typecast`] is consulted by every typecast-aware setter. It is a pure
//! function of the column schema, the raw value and [`TypecastOptions`];
//! the only shared state it reads is the timestamp representation passed
//! in through the options.

use crate::connection::TimestampRepr;
use crate::error::{Error, InvalidValue, Result};
use crate::types::{ColumnSchema, ColumnType};
use crate::value::{Value, format_float, normalize_decimal};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Flags that govern a single typecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypecastOptions {
    /// `typecast_on_assignment`: when false values are stored as given.
    pub enabled: bool,
    /// `raise_on_typecast_failure`: when false a failed cast stores the raw value.
    pub raise_on_failure: bool,
    /// `typecast_empty_string_to_nil`
    pub empty_string_to_nil: bool,
    pub timestamp_repr: TimestampRepr,
}

impl Default for TypecastOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            raise_on_failure: true,
            empty_string_to_nil: true,
            timestamp_repr: TimestampRepr::Naive,
        }
    }
}

/// Coerce `value` to the type declared for `column`.
///
/// Columns without schema information are not typecast. Empty strings
/// become NULL for every type except string and blob, NULL is rejected
/// for columns declared `allow_null = false`, and any failed conversion
/// yields [`Error::InvalidValue`] unless `raise_on_failure` is off, in
/// which case the raw value is returned unchanged.
///
/// # Example
///
/// ```
/// use rowmodel_core::typecast::{TypecastOptions, typecast};
/// use rowmodel_core::types::{ColumnSchema, ColumnType};
/// use rowmodel_core::Value;
///
/// let schema = ColumnSchema::new(ColumnType::Integer);
/// let opts = TypecastOptions::default();
/// assert_eq!(typecast("x", Some(&schema), Value::from("1"), &opts).unwrap(), Value::Integer(1));
/// assert_eq!(typecast("x", Some(&schema), Value::from(""), &opts).unwrap(), Value::Null);
/// ```
pub fn typecast(
    column: &str,
    schema: Option<&ColumnSchema>,
    value: Value,
    opts: &TypecastOptions,
) -> Result<Value> {
    if !opts.enabled {
        return Ok(value);
    }
    let Some(schema) = schema else {
        return Ok(value);
    };

    let value = if opts.empty_string_to_nil
        && value.is_empty_string()
        && !schema.ty.keeps_empty_string()
    {
        Value::Null
    } else {
        value
    };

    if value.is_null() {
        if schema.rejects_null() && opts.raise_on_failure {
            return Err(invalid(column, schema.ty, value, "NULL is not allowed"));
        }
        return Ok(value);
    }

    match cast(schema.ty, &value, opts.timestamp_repr) {
        Ok(cast) => Ok(cast),
        Err(message) if opts.raise_on_failure => Err(invalid(column, schema.ty, value, message)),
        Err(message) => {
            tracing::warn!(
                column = %column,
                expected = schema.ty.name(),
                error = %message,
                "Typecast failed, storing raw value"
            );
            Ok(value)
        }
    }
}

fn invalid(column: &str, ty: ColumnType, value: Value, message: impl Into<String>) -> Error {
    Error::InvalidValue(InvalidValue {
        column: Some(column.to_string()),
        expected: ty.name(),
        value,
        message: message.into(),
    })
}

type CastResult = std::result::Result<Value, String>;

fn cast(ty: ColumnType, value: &Value, repr: TimestampRepr) -> CastResult {
    match ty {
        ColumnType::Integer => cast_integer(value),
        ColumnType::Float => cast_float(value),
        ColumnType::Decimal => cast_decimal(value),
        ColumnType::Boolean => Ok(cast_boolean(value)),
        ColumnType::String => Ok(cast_string(value)),
        ColumnType::Blob => Ok(cast_blob(value)),
        ColumnType::Date => cast_date(value),
        ColumnType::Time => cast_time(value),
        ColumnType::DateTime => cast_datetime(value, repr),
        ColumnType::Other => Ok(value.clone()),
    }
}

fn mismatch(value: &Value) -> String {
    format!("cannot convert {} value {value}", value.type_name())
}

fn cast_integer(value: &Value) -> CastResult {
    match value {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Float(f) => float_to_integer(*f).ok_or_else(|| mismatch(value)),
        Value::Decimal(s) => {
            let int_part = s.split('.').next().unwrap_or_default();
            int_part
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| e.to_string())
        }
        Value::Text(s) => parse_integer(s)
            .map(Value::Integer)
            .ok_or_else(|| format!("invalid integer: {s:?}")),
        _ => Err(mismatch(value)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn float_to_integer(f: f64) -> Option<Value> {
    let truncated = f.trunc();
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Some(Value::Integer(truncated as i64))
    } else {
        None
    }
}

/// Parse integer text, allowing surrounding whitespace and `_` separators
/// between digits.
fn parse_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.starts_with('_') || trimmed.ends_with('_') || trimmed.contains("__") {
        return None;
    }
    trimmed.replace('_', "").parse().ok()
}

#[allow(clippy::cast_precision_loss)]
fn cast_float(value: &Value) -> CastResult {
    let parsed = match value {
        Value::Float(f) => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        Value::Decimal(s) => s.parse().ok(),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    };
    parsed.map(Value::Float).ok_or_else(|| mismatch(value))
}

fn cast_decimal(value: &Value) -> CastResult {
    let normalized = match value {
        Value::Decimal(s) | Value::Text(s) => normalize_decimal(s),
        Value::Integer(i) => normalize_decimal(&i.to_string()),
        Value::Float(f) if f.is_finite() => normalize_decimal(&format_float(*f)),
        _ => None,
    };
    normalized.map(Value::Decimal).ok_or_else(|| mismatch(value))
}

/// `false`, zero, `"0"`, `"f"` and `"false"` are false; blank input is NULL;
/// anything else is true.
fn cast_boolean(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(*b),
        Value::Integer(0) => Value::Bool(false),
        Value::Float(f) if *f == 0.0 => Value::Bool(false),
        Value::Decimal(s) if normalize_decimal(s).as_deref() == Some("0.0") => Value::Bool(false),
        Value::Text(s)
            if s == "0" || s.eq_ignore_ascii_case("f") || s.eq_ignore_ascii_case("false") =>
        {
            Value::Bool(false)
        }
        v if v.is_blank() => Value::Null,
        _ => Value::Bool(true),
    }
}

fn cast_string(value: &Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn cast_blob(value: &Value) -> Value {
    match value {
        Value::Bytes(b) => Value::Bytes(b.clone()),
        Value::Text(s) => Value::Bytes(s.clone().into_bytes()),
        other => Value::Bytes(other.to_string().into_bytes()),
    }
}

fn cast_date(value: &Value) -> CastResult {
    match value {
        Value::Date(d) => Ok(Value::Date(*d)),
        Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
        Value::TimestampTz(ts) => Ok(Value::Date(ts.date_naive())),
        Value::Text(s) => parse_datetime_text(s)
            .map(|parsed| Value::Date(parsed.date))
            .ok_or_else(|| format!("invalid date: {s:?}")),
        Value::Map(map) => date_from_components(map)
            .map(Value::Date)
            .ok_or_else(|| mismatch(value)),
        _ => Err(mismatch(value)),
    }
}

fn cast_time(value: &Value) -> CastResult {
    match value {
        Value::Time(t) => Ok(Value::Time(*t)),
        Value::Timestamp(ts) => Ok(Value::Time(ts.time())),
        Value::TimestampTz(ts) => Ok(Value::Time(ts.time())),
        Value::Text(s) => parse_time_text(s)
            .or_else(|| parse_datetime_text(s).map(|parsed| parsed.time))
            .map(Value::Time)
            .ok_or_else(|| format!("invalid time: {s:?}")),
        Value::Map(map) => time_from_components(map)
            .map(Value::Time)
            .ok_or_else(|| mismatch(value)),
        _ => Err(mismatch(value)),
    }
}

fn cast_datetime(value: &Value, repr: TimestampRepr) -> CastResult {
    let (naive, offset) = match value {
        Value::Timestamp(ts) => (*ts, None),
        Value::TimestampTz(ts) => (ts.naive_local(), Some(*ts.offset())),
        Value::Date(d) => (d.and_time(NaiveTime::MIN), None),
        Value::Text(s) => {
            let parsed =
                parse_datetime_text(s).ok_or_else(|| format!("invalid datetime: {s:?}"))?;
            (parsed.date.and_time(parsed.time), parsed.offset)
        }
        Value::Map(map) => {
            let date = date_from_components(map).ok_or_else(|| mismatch(value))?;
            let time = time_from_components(map).ok_or_else(|| mismatch(value))?;
            (date.and_time(time), None)
        }
        _ => return Err(mismatch(value)),
    };
    to_timestamp(naive, offset, repr).ok_or_else(|| mismatch(value))
}

/// Shape a local datetime and optional offset into the configured
/// representation.
fn to_timestamp(
    naive: NaiveDateTime,
    offset: Option<FixedOffset>,
    repr: TimestampRepr,
) -> Option<Value> {
    match (repr, offset) {
        (TimestampRepr::Naive, None) => Some(Value::Timestamp(naive)),
        (TimestampRepr::Naive, Some(offset)) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|ts| Value::Timestamp(ts.naive_utc())),
        (TimestampRepr::Zoned, offset) => {
            let offset = offset.unwrap_or_else(|| Utc.fix());
            offset
                .from_local_datetime(&naive)
                .single()
                .map(Value::TimestampTz)
        }
    }
}

struct ParsedDateTime {
    date: NaiveDate,
    time: NaiveTime,
    offset: Option<FixedOffset>,
}

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Invalid temporal pattern");
            None
        }
    })
    .as_ref()
}

fn datetime_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(
        &RE,
        concat!(
            r"^\s*(\d{4})[-/](\d{1,2})[-/](\d{1,2})",
            r"(?:(?:T|\s+)(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d+))?)?)?",
            r"\s*(Z|[+-]\d{2}(?::?\d{2})?)?\s*$",
        ),
    )
}

fn time_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&RE, r"^\s*(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d+))?)?\s*$")
}

fn capture_u32(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index).map_or(Some(0), |m| m.as_str().parse().ok())
}

/// Fractional seconds as nanoseconds, truncated to nine digits.
fn capture_nanos(caps: &Captures<'_>, index: usize) -> Option<u32> {
    let Some(frac) = caps.get(index) else {
        return Some(0);
    };
    let digits: String = frac.as_str().chars().take(9).collect();
    format!("{digits:0<9}").parse().ok()
}

fn time_from_captures(caps: &Captures<'_>, first: usize) -> Option<NaiveTime> {
    NaiveTime::from_hms_nano_opt(
        capture_u32(caps, first)?,
        capture_u32(caps, first + 1)?,
        capture_u32(caps, first + 2)?,
        capture_nanos(caps, first + 3)?,
    )
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    if text == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = text.split_at(1);
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = match digits.get(2..) {
        Some("") | None => 0,
        Some(m) => m.parse().ok()?,
    };
    let seconds = hours * 3600 + minutes * 60;
    FixedOffset::east_opt(if sign == "-" { -seconds } else { seconds })
}

fn parse_datetime_text(text: &str) -> Option<ParsedDateTime> {
    let caps = datetime_pattern()?.captures(text)?;
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    let time = if caps.get(4).is_some() {
        time_from_captures(&caps, 4)?
    } else {
        NaiveTime::MIN
    };
    let offset = match caps.get(8) {
        Some(m) => Some(parse_offset(m.as_str())?),
        None => None,
    };
    Some(ParsedDateTime { date, time, offset })
}

fn parse_time_text(text: &str) -> Option<NaiveTime> {
    let caps = time_pattern()?.captures(text)?;
    time_from_captures(&caps, 1)
}

/// Leading integer of a component value; unparseable text counts as 0.
fn component(map: &BTreeMap<String, Value>, key: &str) -> i64 {
    match map.get(key) {
        Some(Value::Integer(i)) => *i,
        Some(Value::Float(f)) => match float_to_integer(*f) {
            Some(Value::Integer(i)) => i,
            _ => 0,
        },
        Some(Value::Text(s)) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
                .map_or(s.len(), |(i, _)| i);
            s[..end].parse().unwrap_or(0)
        }
        _ => 0,
    }
}

fn date_from_components(map: &BTreeMap<String, Value>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::try_from(component(map, "year")).ok()?,
        u32::try_from(component(map, "month")).ok()?,
        u32::try_from(component(map, "day")).ok()?,
    )
}

fn time_from_components(map: &BTreeMap<String, Value>) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(
        u32::try_from(component(map, "hour")).ok()?,
        u32::try_from(component(map, "minute")).ok()?,
        u32::try_from(component(map, "second")).ok()?,
    )
}

/// Parse datetime text into a zoned timestamp; text without an offset is
/// taken as UTC.
pub fn parse_zoned(text: &str) -> Option<DateTime<FixedOffset>> {
    let parsed = parse_datetime_text(text)?;
    let offset = parsed.offset.unwrap_or_else(|| Utc.fix());
    offset
        .from_local_datetime(&parsed.date.and_time(parsed.time))
        .single()
}
