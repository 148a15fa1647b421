//! Field encoding for SQL text dumps.
//!
//! Values are rendered as MySQL literals without going through a driver-side
//! escaping routine, so every rule lives here.

use crate::value::Value;

/// Columns that hold raw binary identifiers in every log table.
pub const BINARY_COLUMNS: &[&str] = &["idvisitor", "config_id", "location_ip"];

/// Blob archives keep their serialized payload in this column.
pub const ARCHIVE_BLOB_VALUE_COLUMN: &str = "value";

const ARCHIVE_BLOB_MARKER: &str = "archive_blob";

/// How a value is written to the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `NULL`
    Null,
    /// `0x` followed by lowercase hex
    Hex,
    /// Unquoted decimal
    Integer,
    /// Single-quoted, escaped
    Quoted,
    /// Types without a dedicated rule (floats, date/times). Written quoted.
    Fallback,
}

/// Whether `column` of `table` stores raw bytes that must be hex encoded.
pub fn is_binary_column(table: &str, column: &str) -> bool {
    BINARY_COLUMNS.contains(&column)
        || (column == ARCHIVE_BLOB_VALUE_COLUMN && table.contains(ARCHIVE_BLOB_MARKER))
}

/// Decide the encoding for one field.
pub fn classify(table: &str, column: &str, value: &Value) -> Encoding {
    match value {
        Value::Null => Encoding::Null,
        _ if is_binary_column(table, column) => Encoding::Hex,
        Value::Int(_) | Value::UInt(_) => Encoding::Integer,
        Value::Text(_) => Encoding::Quoted,
        Value::Bytes(bytes) if std::str::from_utf8(bytes).is_ok() => Encoding::Quoted,
        Value::Bytes(_) => Encoding::Hex,
        Value::Float(_) | Value::DateTime(_) => Encoding::Fallback,
    }
}

/// Encode one field as a dump literal.
pub fn encode(table: &str, column: &str, value: &Value) -> String {
    match classify(table, column, value) {
        Encoding::Null => "NULL".to_string(),
        Encoding::Hex => format!("0x{}", hex::encode(raw_bytes(value))),
        Encoding::Integer => plain_text(value),
        Encoding::Quoted | Encoding::Fallback => quote(&plain_text(value)),
    }
}

/// Single-quote a string, escaping backslashes and quotes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Backtick-quote an identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn raw_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Bytes(bytes) => bytes.clone(),
        other => plain_text(other).into_bytes(),
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Text(s) => s.clone(),
        Value::DateTime(dt) => dt.format(crate::selection::DATETIME_FORMAT).to_string(),
    }
}
