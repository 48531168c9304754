use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use rust_decimal::Decimal;
use sql_mapper::{SqlType, SqlValue};

use crate::error::SqliteError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Borrowed parameter in SQLite storage form: booleans as integers,
/// decimals, temporals and JSON as text.
///
/// Decimal text only survives verbatim in a column with TEXT affinity, such
/// as `DECIMAL_TEXT(30,10)`. A plain `DECIMAL` column has NUMERIC affinity and
/// SQLite rewrites the text as a 15-digit REAL, which [`read_value`] rejects.
pub struct Param<'a>(pub &'a SqlValue);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let owned = |value: SqliteValue| Ok(ToSqlOutput::Owned(value));
        match self.0 {
            SqlValue::Null(_) => owned(SqliteValue::Null),
            SqlValue::Boolean(b) => owned(SqliteValue::Integer(i64::from(*b))),
            SqlValue::SmallInt(n) => owned(SqliteValue::Integer(i64::from(*n))),
            SqlValue::Integer(n) => owned(SqliteValue::Integer(i64::from(*n))),
            SqlValue::BigInt(n) => owned(SqliteValue::Integer(*n)),
            SqlValue::Double(f) => owned(SqliteValue::Real(*f)),
            SqlValue::Decimal(d) => owned(SqliteValue::Text(d.to_string())),
            SqlValue::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            SqlValue::Bytes(b) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&b[..]))),
            SqlValue::Date(d) => owned(SqliteValue::Text(d.format(DATE_FORMAT).to_string())),
            SqlValue::Time(t) => owned(SqliteValue::Text(t.format(TIME_FORMAT).to_string())),
            SqlValue::Timestamp(dt) => {
                owned(SqliteValue::Text(dt.format(TIMESTAMP_FORMAT).to_string()))
            }
            SqlValue::Json(json) => owned(SqliteValue::Text(json.to_string())),
            SqlValue::Clob(lob) => lob
                .read_to_string()
                .map(|s| ToSqlOutput::Owned(SqliteValue::Text(s)))
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e))),
            SqlValue::Blob(lob) => lob
                .read_to_bytes()
                .map(|b| ToSqlOutput::Owned(SqliteValue::Blob(b)))
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e))),
            SqlValue::Opaque { value, .. } => {
                Ok(ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())))
            }
        }
    }
}

/// Declared column type, classified the way SQLite assigns affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Decimal,
    Timestamp,
    Date,
    Time,
    Json,
    Text,
    Blob,
    Unknown,
}

impl Declared {
    pub fn classify(decl_type: Option<&str>) -> Self {
        let Some(decl) = decl_type else {
            return Declared::Unknown;
        };
        let decl = decl.to_ascii_uppercase();
        if decl.contains("BOOL") {
            Declared::Boolean
        } else if decl.contains("SMALLINT") || decl.contains("TINYINT") {
            Declared::SmallInt
        } else if decl == "INT4" || decl == "MEDIUMINT" {
            Declared::Integer
        } else if decl.contains("INT") {
            // SQLite integers are 64-bit, including INTEGER PRIMARY KEY
            Declared::BigInt
        } else if decl.contains("DECIMAL") || decl.contains("NUMERIC") {
            Declared::Decimal
        } else if decl.contains("TIMESTAMP") || decl.contains("DATETIME") {
            Declared::Timestamp
        } else if decl == "DATE" {
            Declared::Date
        } else if decl == "TIME" {
            Declared::Time
        } else if decl.contains("JSON") {
            Declared::Json
        } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
            Declared::Double
        } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
            Declared::Text
        } else if decl.contains("BLOB") {
            Declared::Blob
        } else {
            Declared::Unknown
        }
    }

    pub fn sql_type(self) -> SqlType {
        match self {
            Declared::Boolean => SqlType::Boolean,
            Declared::SmallInt => SqlType::SmallInt,
            Declared::Integer => SqlType::Integer,
            Declared::BigInt => SqlType::BigInt,
            Declared::Double => SqlType::Double,
            Declared::Decimal => SqlType::Decimal,
            Declared::Timestamp => SqlType::Timestamp,
            Declared::Date => SqlType::Date,
            Declared::Time => SqlType::Time,
            Declared::Json => SqlType::Json,
            Declared::Text => SqlType::Varchar,
            Declared::Blob => SqlType::Blob,
            Declared::Unknown => SqlType::Other,
        }
    }
}

/// Rebuilds a column value from its storage class and declared type.
pub fn read_value(
    column: &str,
    value: ValueRef<'_>,
    declared: Declared,
) -> Result<SqlValue, SqliteError> {
    let converted = match value {
        ValueRef::Null => SqlValue::Null(declared.sql_type()),
        ValueRef::Integer(n) => match declared {
            Declared::Boolean => SqlValue::Boolean(n != 0),
            Declared::SmallInt => i16::try_from(n)
                .map(SqlValue::SmallInt)
                .unwrap_or(SqlValue::BigInt(n)),
            Declared::Integer => i32::try_from(n)
                .map(SqlValue::Integer)
                .unwrap_or(SqlValue::BigInt(n)),
            Declared::Decimal => SqlValue::Decimal(Decimal::from(n)),
            Declared::Double => SqlValue::Double(n as f64),
            _ => SqlValue::BigInt(n),
        },
        ValueRef::Real(f) => match declared {
            Declared::Decimal => {
                return Err(SqliteError::InexactDecimal {
                    column: column.to_string(),
                    value: f,
                });
            }
            _ => SqlValue::Double(f),
        },
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| SqliteError::parse(column, "<bytes>", e))?;
            match declared {
                Declared::Decimal => SqlValue::Decimal(
                    text.trim()
                        .parse::<Decimal>()
                        .map_err(|e| SqliteError::parse(column, text, e))?,
                ),
                Declared::Timestamp => SqlValue::Timestamp(
                    parse_timestamp(text).map_err(|e| SqliteError::parse(column, text, e))?,
                ),
                Declared::Date => SqlValue::Date(
                    NaiveDate::parse_from_str(text, DATE_FORMAT)
                        .map_err(|e| SqliteError::parse(column, text, e))?,
                ),
                Declared::Time => SqlValue::Time(
                    NaiveTime::parse_from_str(text, TIME_FORMAT)
                        .map_err(|e| SqliteError::parse(column, text, e))?,
                ),
                Declared::Json => SqlValue::Json(
                    serde_json::from_str(text).map_err(|e| SqliteError::parse(column, text, e))?,
                ),
                _ => SqlValue::Text(text.to_string()),
            }
        }
        ValueRef::Blob(bytes) => SqlValue::Bytes(bytes.to_vec()),
    };
    Ok(converted)
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}
