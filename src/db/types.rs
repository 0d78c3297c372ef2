//! SQL Server type mappings.
//!
//! This module turns TDS column values into JSON values and column
//! descriptors into [`FieldInfo`].
//!
//! # Mapping
//!
//! | TDS value                         | JSON                         |
//! |-----------------------------------|------------------------------|
//! | tinyint, smallint, int, bigint    | number                       |
//! | real, float                       | number (`null` if not finite)|
//! | bit                               | boolean                      |
//! | char/varchar/nchar/nvarchar/text  | string                       |
//! | decimal, numeric, money           | string (exact digits)        |
//! | uniqueidentifier                  | string                       |
//! | date/time types                   | ISO-8601 string              |
//! | xml                               | string                       |
//! | binary, varbinary, image          | base64 string                |
//!
//! Decimals are rendered as strings so no precision is lost on the way to
//! the client.

use crate::models::{FieldInfo, JsonRow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use tiberius::{Column, ColumnData, FromSql, Row};

/// Describe the columns of a result set.
pub fn fields_of(columns: &[Column]) -> Vec<FieldInfo> {
    columns
        .iter()
        .map(|c| FieldInfo::new(c.name(), format!("{:?}", c.column_type())))
        .collect()
}

/// Convert a row into a JSON object keyed by column name.
pub fn row_to_json(row: Row) -> JsonRow {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    names
        .into_iter()
        .zip(row)
        .map(|(name, data)| (name, column_data_to_json(&data)))
        .collect()
}

/// Convert a single column value to JSON.
pub fn column_data_to_json(data: &ColumnData<'static>) -> JsonValue {
    match data {
        ColumnData::U8(v) => opt(*v, JsonValue::from),
        ColumnData::I16(v) => opt(*v, JsonValue::from),
        ColumnData::I32(v) => opt(*v, JsonValue::from),
        ColumnData::I64(v) => opt(*v, JsonValue::from),
        ColumnData::F32(v) => opt(*v, |f| float_to_json(f as f64)),
        ColumnData::F64(v) => opt(*v, float_to_json),
        ColumnData::Bit(v) => opt(*v, JsonValue::Bool),
        ColumnData::String(v) => opt(v.as_ref(), |s| JsonValue::String(s.to_string())),
        ColumnData::Guid(v) => opt(v.as_ref(), |g| JsonValue::String(g.to_string())),
        ColumnData::Binary(v) => opt(v.as_ref(), |b| JsonValue::String(STANDARD.encode(b))),
        ColumnData::Numeric(v) => opt(v.as_ref(), |n| JsonValue::String(n.to_string())),
        ColumnData::Xml(v) => opt(v.as_ref(), |x| JsonValue::String((**x).clone().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(data, |d| d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => temporal::<NaiveDate>(data, |d| d.format("%Y-%m-%d").to_string()),
        ColumnData::Time(_) => temporal::<NaiveTime>(data, |t| t.format("%H:%M:%S%.f").to_string()),
        ColumnData::DateTimeOffset(_) => {
            temporal::<DateTime<FixedOffset>>(data, |d| d.to_rfc3339())
        }
    }
}

fn opt<T>(value: Option<T>, f: impl FnOnce(T) -> JsonValue) -> JsonValue {
    value.map(f).unwrap_or(JsonValue::Null)
}

fn float_to_json(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn temporal<'a, T>(data: &'a ColumnData<'static>, render: impl FnOnce(T) -> String) -> JsonValue
where
    T: FromSql<'a>,
{
    match T::from_sql(data) {
        Ok(Some(value)) => JsonValue::String(render(value)),
        _ => JsonValue::Null,
    }
}
