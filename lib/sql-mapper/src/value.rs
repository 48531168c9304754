//! Native and storage-facing values.
//!
//! [`Value`] is what entity accessors produce and accept. [`SqlValue`] is what
//! crosses the statement boundary. [`crate::ValueCoercer`] converts between the
//! two; [`FieldValue`] converts between `Value` and a concrete Rust field type.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::StorageDatetime;
use crate::error::CoercionError;

/// Declared SQL type of a column or placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Decimal,
    Varchar,
    Clob,
    Binary,
    Blob,
    Date,
    Time,
    Timestamp,
    Json,
    Other,
}

/// Native kind of a mapped field, independent of `Option` wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    I16,
    I32,
    I64,
    /// Arbitrary-precision integer, represented as `i128`.
    BigInteger,
    F64,
    Decimal,
    String,
    Bytes,
    LocalDateTime,
    LocalDate,
    LocalTime,
    /// Legacy UTC instant (`StorageDatetime`, `DateTime<Utc>`), stored as a timestamp.
    Instant,
    Json,
    Enum,
}

impl FieldKind {
    /// Canonical storage-facing type for this kind.
    pub fn coercion_class(self) -> SqlType {
        match self {
            FieldKind::Bool => SqlType::Boolean,
            FieldKind::I16 => SqlType::SmallInt,
            FieldKind::I32 => SqlType::Integer,
            FieldKind::I64 => SqlType::BigInt,
            FieldKind::BigInteger | FieldKind::Decimal => SqlType::Decimal,
            FieldKind::F64 => SqlType::Double,
            FieldKind::String => SqlType::Varchar,
            FieldKind::Bytes => SqlType::Binary,
            FieldKind::LocalDateTime | FieldKind::Instant => SqlType::Timestamp,
            FieldKind::LocalDate => SqlType::Date,
            FieldKind::LocalTime => SqlType::Time,
            FieldKind::Json => SqlType::Json,
            FieldKind::Enum => SqlType::Varchar,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, FieldKind::I16 | FieldKind::I32 | FieldKind::I64)
    }
}

/// A unit enum variant as seen by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ordinal: u32,
    pub name: &'static str,
}

/// Native-facing value produced and consumed by entity field accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    BigInteger(i128),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    LocalDateTime(NaiveDateTime),
    LocalDate(NaiveDate),
    LocalTime(NaiveTime),
    Instant(StorageDatetime),
    Json(serde_json::Value),
    Enum(EnumValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view used for ids and versions.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I16(n) => Some(i64::from(*n)),
            Value::I32(n) => Some(i64::from(*n)),
            Value::I64(n) => Some(*n),
            Value::BigInteger(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I16(n) => write!(f, "{}", n),
            Value::I32(n) => write!(f, "{}", n),
            Value::I64(n) => write!(f, "{}", n),
            Value::BigInteger(n) => write!(f, "{}", n),
            Value::F64(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::LocalDateTime(dt) => write!(f, "{}", dt),
            Value::LocalDate(d) => write!(f, "{}", d),
            Value::LocalTime(t) => write!(f, "{}", t),
            Value::Instant(dt) => write!(f, "{}", dt),
            Value::Json(j) => write!(f, "{}", j),
            Value::Enum(e) => write!(f, "{}", e.name),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::I16(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::I32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::I64(n)
    }
}

impl From<i128> for Value {
    fn from(n: i128) -> Self {
        Value::BigInteger(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::F64(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::LocalDateTime(dt)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::LocalDate(d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::LocalTime(t)
    }
}

impl From<StorageDatetime> for Value {
    fn from(dt: StorageDatetime) -> Self {
        Value::Instant(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A large object handed out by a result set, read lazily on hydration.
#[derive(Clone)]
pub struct LargeObject(Arc<Mutex<Box<dyn Read + Send>>>);

impl LargeObject {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        LargeObject(Arc::new(Mutex::new(Box::new(reader))))
    }

    /// Drains the stream. A second call yields whatever is left (usually nothing).
    pub fn read_to_bytes(&self) -> Result<Vec<u8>, CoercionError> {
        let mut buffer = Vec::new();
        self.0
            .lock()
            .read_to_end(&mut buffer)
            .map_err(|e| CoercionError::LargeObject(e.to_string()))?;
        Ok(buffer)
    }

    pub fn read_to_string(&self) -> Result<String, CoercionError> {
        let bytes = self.read_to_bytes()?;
        String::from_utf8(bytes).map_err(|e| CoercionError::LargeObject(e.to_string()))
    }
}

impl fmt::Debug for LargeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LargeObject(..)")
    }
}

impl PartialEq for LargeObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// 2^63: exactly representable as f64, unlike i64::MAX.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Storage-facing value bound to placeholders and read from result sets.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL, typed with the placeholder's (or column's) declared type.
    Null(SqlType),
    Boolean(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
    Clob(LargeObject),
    Blob(LargeObject),
    /// Backend-specific wrapper (e.g. PostgreSQL `citext`), unwrapped by a
    /// registered [`crate::CoercionRule`].
    Opaque { type_name: String, value: String },
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::SmallInt(n) => Some(i64::from(*n)),
            SqlValue::Integer(n) => Some(i64::from(*n)),
            SqlValue::BigInt(n) => Some(*n),
            SqlValue::Decimal(d) => i64::try_from(d.trunc()).ok(),
            SqlValue::Double(f) if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(f) => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Null(ty) => *ty,
            SqlValue::Boolean(_) => SqlType::Boolean,
            SqlValue::SmallInt(_) => SqlType::SmallInt,
            SqlValue::Integer(_) => SqlType::Integer,
            SqlValue::BigInt(_) => SqlType::BigInt,
            SqlValue::Double(_) => SqlType::Double,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::Text(_) => SqlType::Varchar,
            SqlValue::Bytes(_) => SqlType::Binary,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
            SqlValue::Timestamp(_) => SqlType::Timestamp,
            SqlValue::Json(_) => SqlType::Json,
            SqlValue::Clob(_) => SqlType::Clob,
            SqlValue::Blob(_) => SqlType::Blob,
            SqlValue::Opaque { .. } => SqlType::Other,
        }
    }
}

/// Conversion between a concrete field type and [`Value`].
///
/// Implementations only perform lossless conversions; the coercion table
/// lives in [`crate::ValueCoercer`]. `Option<T>` maps `None` to [`Value::Null`].
pub trait FieldValue: Sized {
    const KIND: FieldKind;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, CoercionError>;
}

fn mismatch<T>(value: Value, kind: FieldKind) -> Result<T, CoercionError> {
    Err(CoercionError::unsupported(value, kind))
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for i16 {
    const KIND: FieldKind = FieldKind::I16;

    fn to_value(&self) -> Value {
        Value::I16(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::I16(n) => Ok(n),
            Value::I32(n) => i16::try_from(n).map_err(|_| CoercionError::overflow(n, "i16")),
            Value::I64(n) => i16::try_from(n).map_err(|_| CoercionError::overflow(n, "i16")),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for i32 {
    const KIND: FieldKind = FieldKind::I32;

    fn to_value(&self) -> Value {
        Value::I32(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::I16(n) => Ok(i32::from(n)),
            Value::I32(n) => Ok(n),
            Value::I64(n) => i32::try_from(n).map_err(|_| CoercionError::overflow(n, "i32")),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for i64 {
    const KIND: FieldKind = FieldKind::I64;

    fn to_value(&self) -> Value {
        Value::I64(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::I16(n) => Ok(i64::from(n)),
            Value::I32(n) => Ok(i64::from(n)),
            Value::I64(n) => Ok(n),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for i128 {
    const KIND: FieldKind = FieldKind::BigInteger;

    fn to_value(&self) -> Value {
        Value::BigInteger(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::BigInteger(n) => Ok(n),
            Value::I64(n) => Ok(i128::from(n)),
            Value::I32(n) => Ok(i128::from(n)),
            Value::I16(n) => Ok(i128::from(n)),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::F64;

    fn to_value(&self) -> Value {
        Value::F64(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::F64(n) => Ok(n),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for Decimal {
    const KIND: FieldKind = FieldKind::Decimal;

    fn to_value(&self) -> Value {
        Value::Decimal(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Decimal(d) => Ok(d),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::String;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::String(s) => Ok(s),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for Vec<u8> {
    const KIND: FieldKind = FieldKind::Bytes;

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for NaiveDateTime {
    const KIND: FieldKind = FieldKind::LocalDateTime;

    fn to_value(&self) -> Value {
        Value::LocalDateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::LocalDateTime(dt) => Ok(dt),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for NaiveDate {
    const KIND: FieldKind = FieldKind::LocalDate;

    fn to_value(&self) -> Value {
        Value::LocalDate(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::LocalDate(d) => Ok(d),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for NaiveTime {
    const KIND: FieldKind = FieldKind::LocalTime;

    fn to_value(&self) -> Value {
        Value::LocalTime(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::LocalTime(t) => Ok(t),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for StorageDatetime {
    const KIND: FieldKind = FieldKind::Instant;

    fn to_value(&self) -> Value {
        Value::Instant(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Instant(dt) => Ok(dt),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Instant;

    fn to_value(&self) -> Value {
        Value::Instant(StorageDatetime::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Instant(dt) => Ok(dt.into()),
            other => mismatch(other, Self::KIND),
        }
    }
}

impl FieldValue for serde_json::Value {
    const KIND: FieldKind = FieldKind::Json;

    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Json(j) => Ok(j),
            other => mismatch(other, Self::KIND),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_maps_none_to_null() {
        let none: Option<i32> = None;
        assert_eq!(none.to_value(), Value::Null);
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::I32(7)).unwrap(), Some(7));
        assert_eq!(<Option<i32> as FieldValue>::KIND, FieldKind::I32);
    }

    #[test]
    fn integer_widening_is_lossless_and_narrowing_checked() {
        assert_eq!(i64::from_value(Value::I32(42)).unwrap(), 42);
        assert_eq!(i32::from_value(Value::I64(42)).unwrap(), 42);
        assert!(matches!(
            i32::from_value(Value::I64(i64::MAX)),
            Err(CoercionError::Overflow { .. })
        ));
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let err = String::from_value(Value::I64(1)).unwrap_err();
        assert!(matches!(err, CoercionError::Unsupported { .. }));
    }

    #[test]
    fn large_object_reads_once() {
        let lob = LargeObject::new(std::io::Cursor::new(b"long text".to_vec()));
        assert_eq!(lob.read_to_string().unwrap(), "long text");
        assert_eq!(lob.read_to_string().unwrap(), "");
    }

    #[test]
    fn instant_kind_normalizes_to_timestamp() {
        assert_eq!(FieldKind::Instant.coercion_class(), SqlType::Timestamp);
        assert_eq!(FieldKind::BigInteger.coercion_class(), SqlType::Decimal);
    }
}
