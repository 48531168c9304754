//! Bidirectional conversion between field values and column values.
//!
//! | native | storage |
//! |---|---|
//! | `NaiveDateTime`, `StorageDatetime` | `Timestamp` |
//! | `NaiveDate` | `Date` |
//! | `NaiveTime` | `Time` |
//! | `i128` | `Decimal` |
//! | `bool` | `Boolean`, or `SmallInt` 0/1 |
//!
//! Everything else passes through in its natural storage form.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveTime;
use rust_decimal::Decimal;

use crate::StorageDatetime;
use crate::entity::EnumMode;
use crate::error::CoercionError;
use crate::mapping::{ColumnMapping, EnumLookup};
use crate::value::{EnumValue, FieldKind, SqlType, SqlValue, Value};

/// Unwraps a backend-specific column value into a standard one.
///
/// Rules run on the read path after large objects are materialized and
/// before temporal and numeric conversion. The first matching rule wins.
pub trait CoercionRule: Send + Sync {
    fn matches(&self, value: &SqlValue) -> bool;

    fn unwrap(&self, value: SqlValue) -> Result<SqlValue, CoercionError>;
}

/// Treats an opaque driver type (e.g. PostgreSQL `citext`) as text.
#[derive(Debug, Clone)]
pub struct OpaqueTextRule {
    type_name: String,
}

impl OpaqueTextRule {
    pub fn new(type_name: impl Into<String>) -> Self {
        OpaqueTextRule {
            type_name: type_name.into(),
        }
    }
}

impl CoercionRule for OpaqueTextRule {
    fn matches(&self, value: &SqlValue) -> bool {
        matches!(
            value,
            SqlValue::Opaque { type_name, .. } if type_name.eq_ignore_ascii_case(&self.type_name)
        )
    }

    fn unwrap(&self, value: SqlValue) -> Result<SqlValue, CoercionError> {
        match value {
            SqlValue::Opaque { value, .. } => Ok(SqlValue::Text(value)),
            other => Ok(other),
        }
    }
}

#[derive(Clone, Default)]
pub struct ValueCoercer {
    rules: Vec<Arc<dyn CoercionRule>>,
}

impl fmt::Debug for ValueCoercer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCoercer")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl ValueCoercer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl CoercionRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Write path for a mapped column: converter, then enum mapping, then the
    /// conversion table. `declared` is the placeholder's type when the driver
    /// reports one; otherwise the column's coercion class is used.
    pub fn to_column(
        &self,
        column: &ColumnMapping,
        value: Value,
        declared: Option<SqlType>,
    ) -> Result<SqlValue, CoercionError> {
        if let Some(converter) = &column.converter {
            return converter.to_column(value);
        }
        let target = declared.unwrap_or(column.coercion);
        match (value, &column.enum_lookup) {
            (Value::Null, _) => Ok(SqlValue::Null(target)),
            (Value::Enum(variant), Some(lookup)) => enum_to_column(variant, lookup, &column.column),
            (value, _) => self.to_sql(value, target),
        }
    }

    /// Write path for an unmapped value such as a clause argument.
    pub fn to_sql(&self, value: Value, target: SqlType) -> Result<SqlValue, CoercionError> {
        let converted = match value {
            Value::Null => SqlValue::Null(target),
            Value::Bool(b) => match target {
                SqlType::SmallInt => SqlValue::SmallInt(i16::from(b)),
                SqlType::Integer => SqlValue::Integer(i32::from(b)),
                SqlType::BigInt => SqlValue::BigInt(i64::from(b)),
                _ => SqlValue::Boolean(b),
            },
            Value::I16(n) => match target {
                SqlType::Integer => SqlValue::Integer(i32::from(n)),
                SqlType::BigInt => SqlValue::BigInt(i64::from(n)),
                SqlType::Decimal => SqlValue::Decimal(Decimal::from(n)),
                _ => SqlValue::SmallInt(n),
            },
            Value::I32(n) => match target {
                SqlType::SmallInt => {
                    SqlValue::SmallInt(
                        i16::try_from(n).map_err(|_| CoercionError::overflow(n, "SMALLINT"))?,
                    )
                }
                SqlType::BigInt => SqlValue::BigInt(i64::from(n)),
                SqlType::Decimal => SqlValue::Decimal(Decimal::from(n)),
                _ => SqlValue::Integer(n),
            },
            Value::I64(n) => match target {
                SqlType::SmallInt => {
                    SqlValue::SmallInt(
                        i16::try_from(n).map_err(|_| CoercionError::overflow(n, "SMALLINT"))?,
                    )
                }
                SqlType::Integer => {
                    SqlValue::Integer(
                        i32::try_from(n).map_err(|_| CoercionError::overflow(n, "INTEGER"))?,
                    )
                }
                SqlType::Decimal => SqlValue::Decimal(Decimal::from(n)),
                _ => SqlValue::BigInt(n),
            },
            Value::BigInteger(n) => match target {
                SqlType::BigInt => {
                    SqlValue::BigInt(
                        i64::try_from(n).map_err(|_| CoercionError::overflow(n, "BIGINT"))?,
                    )
                }
                _ => SqlValue::Decimal(
                    Decimal::try_from_i128_with_scale(n, 0)
                        .map_err(|_| CoercionError::overflow(n, "DECIMAL"))?,
                ),
            },
            Value::F64(f) => match target {
                SqlType::Decimal => SqlValue::Decimal(
                    Decimal::try_from(f).map_err(|_| CoercionError::overflow(f, "DECIMAL"))?,
                ),
                _ => SqlValue::Double(f),
            },
            Value::Decimal(d) => SqlValue::Decimal(d),
            Value::String(s) => SqlValue::Text(s),
            Value::Bytes(b) => SqlValue::Bytes(b),
            Value::LocalDateTime(dt) => SqlValue::Timestamp(dt),
            Value::LocalDate(d) => SqlValue::Date(d),
            Value::LocalTime(t) => SqlValue::Time(t),
            Value::Instant(instant) => SqlValue::Timestamp(instant.naive_utc()),
            Value::Json(json) => match target {
                SqlType::Varchar | SqlType::Clob => SqlValue::Text(json.to_string()),
                _ => SqlValue::Json(json),
            },
            Value::Enum(variant) => SqlValue::Text(variant.name.to_string()),
        };
        Ok(converted)
    }

    /// Read path for a mapped column: converter, enum lookup, large-object
    /// materialization, registered rules, then conversion to the field kind.
    pub fn to_field(
        &self,
        column: &ColumnMapping,
        value: SqlValue,
    ) -> Result<Value, CoercionError> {
        if let Some(converter) = &column.converter {
            return converter.to_attribute(value);
        }
        if value.is_null() {
            return Ok(Value::Null);
        }
        let value = self.unwrap_rules(materialize(value)?)?;
        if let Some(lookup) = &column.enum_lookup {
            return enum_from_column(value, lookup, &column.column);
        }
        convert(value, column.kind)
    }

    /// Converts a standard column value to the native form of `kind`.
    pub fn to_kind(&self, value: SqlValue, kind: FieldKind) -> Result<Value, CoercionError> {
        convert(self.unwrap_rules(materialize(value)?)?, kind)
    }

    fn unwrap_rules(&self, value: SqlValue) -> Result<SqlValue, CoercionError> {
        match self.rules.iter().find(|rule| rule.matches(&value)) {
            Some(rule) => rule.unwrap(value),
            None => Ok(value),
        }
    }
}

/// Read-path conversion of a value that rules have already unwrapped.
fn convert(value: SqlValue, kind: FieldKind) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let converted = match (kind, value) {
        (FieldKind::Bool, SqlValue::Boolean(b)) => Value::Bool(b),
        (
            FieldKind::Bool,
            v @ (SqlValue::SmallInt(_) | SqlValue::Integer(_) | SqlValue::BigInt(_)),
        ) => {
            Value::Bool(v.as_i64().unwrap_or_default() != 0)
        }
        (FieldKind::I16, v) => Value::I16(narrow(v, "i16")?),
        (FieldKind::I32, v) => Value::I32(narrow(v, "i32")?),
        (FieldKind::I64, v) => Value::I64(narrow(v, "i64")?),
        (FieldKind::BigInteger, SqlValue::Decimal(d)) => {
            let whole = d.trunc();
            Value::BigInteger(whole.mantissa() / 10i128.pow(whole.scale()))
        }
        (
            FieldKind::BigInteger,
            v @ (SqlValue::SmallInt(_) | SqlValue::Integer(_) | SqlValue::BigInt(_)),
        ) => {
            Value::BigInteger(i128::from(v.as_i64().unwrap_or_default()))
        }
        (FieldKind::BigInteger, SqlValue::Text(s)) => {
            Value::BigInteger(s.trim().parse::<i128>().map_err(|e| CoercionError::Parse {
                input: s.clone(),
                to: "i128".to_string(),
                reason: e.to_string(),
            })?)
        }
        (FieldKind::F64, SqlValue::Double(f)) => Value::F64(f),
        (FieldKind::F64, SqlValue::Decimal(d)) => {
            Value::F64(f64::try_from(d).map_err(|_| CoercionError::overflow(d, "f64"))?)
        }
        (
            FieldKind::F64,
            v @ (SqlValue::SmallInt(_) | SqlValue::Integer(_) | SqlValue::BigInt(_)),
        ) => {
            Value::F64(v.as_i64().unwrap_or_default() as f64)
        }
        (FieldKind::Decimal, SqlValue::Decimal(d)) => Value::Decimal(d),
        (
            FieldKind::Decimal,
            v @ (SqlValue::SmallInt(_) | SqlValue::Integer(_) | SqlValue::BigInt(_)),
        ) => {
            Value::Decimal(Decimal::from(v.as_i64().unwrap_or_default()))
        }
        (FieldKind::Decimal, SqlValue::Double(f)) => {
            let d = Decimal::try_from(f).map_err(|_| CoercionError::overflow(f, "Decimal"))?;
            Value::Decimal(d)
        }
        (FieldKind::Decimal, SqlValue::Text(s)) => {
            Value::Decimal(s.trim().parse::<Decimal>().map_err(|e| CoercionError::Parse {
                input: s.clone(),
                to: "Decimal".to_string(),
                reason: e.to_string(),
            })?)
        }
        (FieldKind::String, SqlValue::Text(s)) => Value::String(s),
        (FieldKind::String, SqlValue::Json(json)) => Value::String(json.to_string()),
        (FieldKind::Bytes, SqlValue::Bytes(b)) => Value::Bytes(b),
        (FieldKind::LocalDateTime, SqlValue::Timestamp(dt)) => Value::LocalDateTime(dt),
        (FieldKind::LocalDateTime, SqlValue::Date(d)) => {
            Value::LocalDateTime(d.and_time(NaiveTime::MIN))
        }
        (FieldKind::LocalDate, SqlValue::Date(d)) => Value::LocalDate(d),
        (FieldKind::LocalDate, SqlValue::Timestamp(dt)) => Value::LocalDate(dt.date()),
        (FieldKind::LocalTime, SqlValue::Time(t)) => Value::LocalTime(t),
        (FieldKind::LocalTime, SqlValue::Timestamp(dt)) => Value::LocalTime(dt.time()),
        (FieldKind::Instant, SqlValue::Timestamp(dt)) => {
            Value::Instant(StorageDatetime::from_naive_utc(dt))
        }
        (FieldKind::Instant, SqlValue::Date(d)) => {
            Value::Instant(StorageDatetime::from_naive_utc(d.and_time(NaiveTime::MIN)))
        }
        (FieldKind::Json, SqlValue::Json(json)) => Value::Json(json),
        (FieldKind::Json, SqlValue::Text(s)) => {
            Value::Json(serde_json::from_str(&s).map_err(|e| CoercionError::Parse {
                input: s.clone(),
                to: "JSON".to_string(),
                reason: e.to_string(),
            })?)
        }
        (kind, other) => return Err(CoercionError::unsupported(other, kind)),
    };
    Ok(converted)
}

fn materialize(value: SqlValue) -> Result<SqlValue, CoercionError> {
    match value {
        SqlValue::Clob(lob) => lob.read_to_string().map(SqlValue::Text),
        SqlValue::Blob(lob) => lob.read_to_bytes().map(SqlValue::Bytes),
        other => Ok(other),
    }
}

fn narrow<T>(value: SqlValue, to: &str) -> Result<T, CoercionError>
where
    T: TryFrom<i64>,
{
    let wide = match &value {
        SqlValue::Boolean(b) => i64::from(*b),
        SqlValue::Decimal(d) => {
            i64::try_from(d.trunc()).map_err(|_| CoercionError::overflow(d, to))?
        }
        SqlValue::Double(f) if f.fract() == 0.0 => value
            .as_i64()
            .ok_or_else(|| CoercionError::overflow(f, to))?,
        other => other
            .as_i64()
            .ok_or_else(|| CoercionError::unsupported(&value, to))?,
    };
    T::try_from(wide).map_err(|_| CoercionError::overflow(wide, to))
}

fn enum_to_column(
    variant: EnumValue,
    lookup: &EnumLookup,
    column: &str,
) -> Result<SqlValue, CoercionError> {
    let name = lookup
        .name(variant.ordinal)
        .ok_or_else(|| CoercionError::UnknownEnumKey {
            key: variant.ordinal.to_string(),
            column: column.to_string(),
        })?;
    match lookup.mode() {
        EnumMode::Ordinal => i32::try_from(variant.ordinal)
            .map(SqlValue::Integer)
            .map_err(|_| CoercionError::overflow(variant.ordinal, "INTEGER")),
        EnumMode::Name => Ok(SqlValue::Text(name.to_string())),
    }
}

fn enum_from_column(
    value: SqlValue,
    lookup: &EnumLookup,
    column: &str,
) -> Result<Value, CoercionError> {
    let unknown = |key: String| CoercionError::UnknownEnumKey {
        key,
        column: column.to_string(),
    };
    let ordinal = match value {
        SqlValue::Text(name) => lookup.ordinal(&name).ok_or_else(|| unknown(name))?,
        other => {
            let key = other.as_i64().ok_or_else(|| unknown(format!("{:?}", other)))?;
            u32::try_from(key)
                .ok()
                .filter(|&o| lookup.name(o).is_some())
                .ok_or_else(|| unknown(key.to_string()))?
        }
    };
    let name = lookup
        .name(ordinal)
        .ok_or_else(|| unknown(ordinal.to_string()))?;
    Ok(Value::Enum(EnumValue { ordinal, name }))
}
