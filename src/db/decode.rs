//! Result materialization: driver rows into ordered records of scalars.
//!
//! Decoding runs in two phases: a shared classifier buckets the reported
//! column type, then a database-specific decoder extracts the value as a
//! `ScalarValue`. Raw byte buffers are normalized to text as each record is
//! assembled. Any scan failure aborts the whole result; a partial record
//! sequence is never returned.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

use crate::db::executor::RowSet;
use crate::error::{ToolError, ToolResult};
use crate::models::{Record, ScalarValue};

/// Materialize every fetched row, preserving row and column order.
///
/// A zero-row result yields an empty vector, never an error.
pub fn materialize(rows: &RowSet) -> ToolResult<Vec<Record>> {
    match rows {
        RowSet::MySql(rows) => rows.iter().map(mysql::decode_row).collect(),
        RowSet::Postgres(rows) => rows.iter().map(postgres::decode_row).collect(),
        RowSet::SQLite(rows) => rows.iter().map(sqlite::decode_row).collect(),
    }
}

/// Logical class of a reported column type, shared across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeClass {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Timestamp,
    Date,
    Time,
    Json,
    Text,
}

fn classify(type_name: &str) -> TypeClass {
    let lower = type_name.to_lowercase();

    // Decimal first: "numeric" would otherwise be swallowed by later checks.
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeClass::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeClass::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeClass::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeClass::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeClass::Json;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeClass::Binary;
    }
    if lower.starts_with("timestamp") || lower == "datetime" {
        return TypeClass::Timestamp;
    }
    if lower == "date" {
        return TypeClass::Date;
    }
    if lower == "time" || lower == "timetz" {
        return TypeClass::Time;
    }
    TypeClass::Text
}

fn scan_error(column: &str, e: sqlx::Error) -> ToolError {
    ToolError::decode_failed(Some(column.to_string()), e.to_string())
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper that decodes DECIMAL/NUMERIC columns as their exact string
/// representation, preserving precision the float types would lose.
struct TextDecimal(String);

impl Type<sqlx::MySql> for TextDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for TextDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(TextDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for TextDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for TextDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(TextDecimal(s.to_string()))
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;

    pub fn decode_row(row: &MySqlRow) -> ToolResult<Record> {
        let mut record = Record::with_capacity(row.columns().len());
        for (idx, column) in row.columns().iter().enumerate() {
            let value = decode_column(row, idx, column.type_info().name())
                .map_err(|e| scan_error(column.name(), e))?;
            record.push(column.name(), value.normalize());
        }
        Ok(record)
    }

    fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
    ) -> Result<ScalarValue, sqlx::Error> {
        match classify(type_name) {
            TypeClass::Integer => decode_integer(row, idx, type_name),
            TypeClass::Float => decode_float(row, idx),
            TypeClass::Decimal => {
                let v = row.try_get::<Option<TextDecimal>, _>(idx)?;
                Ok(v.map(|d| ScalarValue::Text(d.0)).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Boolean => {
                let v = row.try_get::<Option<bool>, _>(idx)?;
                Ok(v.map(ScalarValue::Bool).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Binary => {
                let v = row.try_get::<Option<Vec<u8>>, _>(idx)?;
                Ok(v.map(ScalarValue::Raw).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Timestamp => decode_timestamp(row, idx),
            TypeClass::Date => {
                let v = row.try_get::<Option<NaiveDate>, _>(idx)?;
                Ok(v.map(|d| ScalarValue::Text(d.to_string()))
                    .unwrap_or(ScalarValue::Null))
            }
            TypeClass::Time => {
                let v = row.try_get::<Option<NaiveTime>, _>(idx)?;
                Ok(v.map(|t| ScalarValue::Text(t.to_string()))
                    .unwrap_or(ScalarValue::Null))
            }
            TypeClass::Json => {
                let v = row.try_get::<Option<serde_json::Value>, _>(idx)?;
                Ok(v.map(|j| ScalarValue::Text(j.to_string()))
                    .unwrap_or(ScalarValue::Null))
            }
            TypeClass::Text => {
                let v = row.try_get::<Option<String>, _>(idx)?;
                Ok(v.map(ScalarValue::Text).unwrap_or(ScalarValue::Null))
            }
        }
    }

    fn decode_integer(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
    ) -> Result<ScalarValue, sqlx::Error> {
        if type_name.to_lowercase().contains("unsigned") {
            let v = row.try_get::<Option<u64>, _>(idx)?;
            return Ok(match v {
                None => ScalarValue::Null,
                Some(v) => match i64::try_from(v) {
                    Ok(i) => ScalarValue::Int(i),
                    // Values above i64 keep their exact digits as text.
                    Err(_) => ScalarValue::Text(v.to_string()),
                },
            });
        }
        let v = row.try_get::<Option<i64>, _>(idx)?;
        Ok(v.map(ScalarValue::Int).unwrap_or(ScalarValue::Null))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Result<ScalarValue, sqlx::Error> {
        match row.try_get::<Option<f64>, _>(idx) {
            Ok(v) => Ok(v.map(ScalarValue::Float).unwrap_or(ScalarValue::Null)),
            Err(_) => {
                let v = row.try_get::<Option<f32>, _>(idx)?;
                Ok(v.map(|f| ScalarValue::Float(f as f64))
                    .unwrap_or(ScalarValue::Null))
            }
        }
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> Result<ScalarValue, sqlx::Error> {
        match row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            Ok(v) => Ok(v.map(ScalarValue::Timestamp).unwrap_or(ScalarValue::Null)),
            Err(_) => {
                let v = row.try_get::<Option<NaiveDateTime>, _>(idx)?;
                Ok(v.map(|dt| ScalarValue::Timestamp(dt.and_utc()))
                    .unwrap_or(ScalarValue::Null))
            }
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::postgres::PgRow;

    pub fn decode_row(row: &PgRow) -> ToolResult<Record> {
        let mut record = Record::with_capacity(row.columns().len());
        for (idx, column) in row.columns().iter().enumerate() {
            let value = decode_column(row, idx, column.type_info().name())
                .map_err(|e| scan_error(column.name(), e))?;
            record.push(column.name(), value.normalize());
        }
        Ok(record)
    }

    fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
    ) -> Result<ScalarValue, sqlx::Error> {
        if type_name == "UUID" {
            let v = row.try_get::<Option<uuid::Uuid>, _>(idx)?;
            return Ok(v.map(|u| ScalarValue::Text(u.to_string()))
                .unwrap_or(ScalarValue::Null));
        }
        match classify(type_name) {
            TypeClass::Integer => decode_integer(row, idx, type_name),
            TypeClass::Float => decode_float(row, idx, type_name),
            TypeClass::Decimal => {
                let v = row.try_get::<Option<TextDecimal>, _>(idx)?;
                Ok(v.map(|d| ScalarValue::Text(d.0)).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Boolean => {
                let v = row.try_get::<Option<bool>, _>(idx)?;
                Ok(v.map(ScalarValue::Bool).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Binary => {
                let v = row.try_get::<Option<Vec<u8>>, _>(idx)?;
                Ok(v.map(ScalarValue::Raw).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Timestamp => decode_timestamp(row, idx, type_name),
            TypeClass::Date => {
                let v = row.try_get::<Option<NaiveDate>, _>(idx)?;
                Ok(v.map(|d| ScalarValue::Text(d.to_string()))
                    .unwrap_or(ScalarValue::Null))
            }
            TypeClass::Time => {
                let v = row.try_get::<Option<NaiveTime>, _>(idx)?;
                Ok(v.map(|t| ScalarValue::Text(t.to_string()))
                    .unwrap_or(ScalarValue::Null))
            }
            TypeClass::Json => {
                let v = row.try_get::<Option<serde_json::Value>, _>(idx)?;
                Ok(v.map(|j| ScalarValue::Text(j.to_string()))
                    .unwrap_or(ScalarValue::Null))
            }
            TypeClass::Text => {
                let v = row.try_get::<Option<String>, _>(idx)?;
                Ok(v.map(ScalarValue::Text).unwrap_or(ScalarValue::Null))
            }
        }
    }

    // Postgres does not widen integers on decode; use the exact width.
    fn decode_integer(
        row: &PgRow,
        idx: usize,
        type_name: &str,
    ) -> Result<ScalarValue, sqlx::Error> {
        match type_name {
            "INT2" => {
                let v = row.try_get::<Option<i16>, _>(idx)?;
                Ok(v.map(|v| ScalarValue::Int(v as i64))
                    .unwrap_or(ScalarValue::Null))
            }
            "INT4" => {
                let v = row.try_get::<Option<i32>, _>(idx)?;
                Ok(v.map(|v| ScalarValue::Int(v as i64))
                    .unwrap_or(ScalarValue::Null))
            }
            _ => {
                let v = row.try_get::<Option<i64>, _>(idx)?;
                Ok(v.map(ScalarValue::Int).unwrap_or(ScalarValue::Null))
            }
        }
    }

    fn decode_float(row: &PgRow, idx: usize, type_name: &str) -> Result<ScalarValue, sqlx::Error> {
        if type_name == "FLOAT4" {
            let v = row.try_get::<Option<f32>, _>(idx)?;
            return Ok(v.map(|f| ScalarValue::Float(f as f64))
                .unwrap_or(ScalarValue::Null));
        }
        let v = row.try_get::<Option<f64>, _>(idx)?;
        Ok(v.map(ScalarValue::Float).unwrap_or(ScalarValue::Null))
    }

    fn decode_timestamp(
        row: &PgRow,
        idx: usize,
        type_name: &str,
    ) -> Result<ScalarValue, sqlx::Error> {
        if type_name == "TIMESTAMPTZ" {
            let v = row.try_get::<Option<DateTime<Utc>>, _>(idx)?;
            return Ok(v.map(ScalarValue::Timestamp).unwrap_or(ScalarValue::Null));
        }
        let v = row.try_get::<Option<NaiveDateTime>, _>(idx)?;
        Ok(v.map(|dt| ScalarValue::Timestamp(dt.and_utc()))
            .unwrap_or(ScalarValue::Null))
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteRow;

    pub fn decode_row(row: &SqliteRow) -> ToolResult<Record> {
        let mut record = Record::with_capacity(row.columns().len());
        for (idx, column) in row.columns().iter().enumerate() {
            let value = decode_column(row, idx, column.type_info().name())
                .map_err(|e| scan_error(column.name(), e))?;
            record.push(column.name(), value.normalize());
        }
        Ok(record)
    }

    fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
    ) -> Result<ScalarValue, sqlx::Error> {
        match classify(type_name) {
            TypeClass::Integer => {
                let v = row.try_get::<Option<i64>, _>(idx)?;
                Ok(v.map(ScalarValue::Int).unwrap_or(ScalarValue::Null))
            }
            // SQLite NUMERIC is floating point, not fixed decimal.
            TypeClass::Float | TypeClass::Decimal => {
                let v = row.try_get::<Option<f64>, _>(idx)?;
                Ok(v.map(ScalarValue::Float).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Boolean => {
                let v = row.try_get::<Option<bool>, _>(idx)?;
                Ok(v.map(ScalarValue::Bool).unwrap_or(ScalarValue::Null))
            }
            TypeClass::Binary => {
                let v = row.try_get::<Option<Vec<u8>>, _>(idx)?;
                Ok(v.map(ScalarValue::Raw).unwrap_or(ScalarValue::Null))
            }
            // SQLite stores date/time values as text.
            TypeClass::Timestamp
            | TypeClass::Date
            | TypeClass::Time
            | TypeClass::Json
            | TypeClass::Text => {
                let v = row.try_get::<Option<String>, _>(idx)?;
                Ok(v.map(ScalarValue::Text).unwrap_or(ScalarValue::Null))
            }
        }
    }
}
