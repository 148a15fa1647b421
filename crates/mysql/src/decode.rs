//! Dynamic decoding of MySQL result rows into purge-core values.
//!
//! The purge pipeline reads `SELECT *` from tables whose schema it does not
//! know up front, so every column is decoded from its declared type name.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use purge_core::{Row, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// Written for `0000-00-00 00:00:00`, which chrono cannot represent.
pub const ZERO_DATETIME: &str = "0000-00-00 00:00:00";

/// How a column type maps onto `Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Signed,
    Unsigned,
    Float,
    Decimal,
    DateTime,
    Date,
    Time,
    Binary,
    Text,
}

/// Classify a MySQL type name as reported by the driver, e.g. `INT UNSIGNED`.
pub fn column_kind(type_name: &str) -> ColumnKind {
    let upper = type_name.to_ascii_uppercase();
    let base = upper.split_whitespace().next().unwrap_or("");

    match base {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR"
        | "BOOLEAN" => {
            if upper.contains("UNSIGNED") || base == "YEAR" {
                ColumnKind::Unsigned
            } else {
                ColumnKind::Signed
            }
        }
        "FLOAT" | "DOUBLE" | "REAL" => ColumnKind::Float,
        "DECIMAL" | "NUMERIC" => ColumnKind::Decimal,
        "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => ColumnKind::Binary,
        _ => ColumnKind::Text,
    }
}

/// Decode every column of a row, keeping the column order of the result set.
pub fn decode_row(row: &MySqlRow) -> Result<Row, sqlx::Error> {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_column(row, column.ordinal(), column.type_info().name())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

fn decode_column(row: &MySqlRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match column_kind(type_name) {
        ColumnKind::Signed => Value::Int(row.try_get_unchecked::<i64, _>(idx)?),
        ColumnKind::Unsigned => Value::UInt(row.try_get_unchecked::<u64, _>(idx)?),
        ColumnKind::Float => Value::Float(row.try_get_unchecked::<f64, _>(idx)?),
        ColumnKind::Decimal => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
        ColumnKind::DateTime => match row.try_get_unchecked::<NaiveDateTime, _>(idx) {
            Ok(dt) => Value::DateTime(dt),
            Err(_) => Value::Text(ZERO_DATETIME.to_string()),
        },
        ColumnKind::Date => match row.try_get_unchecked::<NaiveDate, _>(idx) {
            Ok(date) => Value::Text(date.to_string()),
            Err(_) => Value::Text("0000-00-00".to_string()),
        },
        ColumnKind::Time => Value::Text(row.try_get_unchecked::<NaiveTime, _>(idx)?.to_string()),
        ColumnKind::Binary => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        ColumnKind::Text => match row.try_get_unchecked::<String, _>(idx) {
            Ok(s) => Value::Text(s),
            Err(_) => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        },
    };

    Ok(value)
}
