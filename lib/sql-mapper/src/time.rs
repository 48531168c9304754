use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Legacy UTC instant with microsecond precision.
///
/// Fields of this type (and `DateTime<Utc>`) are stored in `TIMESTAMP`
/// columns as naive UTC date-times and read back the same way.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageDatetime(pub DateTime<Utc>);

// Always microseconds with a Z suffix
impl Serialize for StorageDatetime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }
}

impl<'de> Deserialize<'de> for StorageDatetime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| StorageDatetime::from(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}

impl StorageDatetime {
    /// Interprets a timestamp column value as UTC.
    pub fn from_naive_utc(naive: NaiveDateTime) -> Self {
        StorageDatetime(truncate_micros(naive.and_utc()))
    }

    /// Timestamp column representation.
    pub fn naive_utc(&self) -> NaiveDateTime {
        self.0.naive_utc()
    }
}

impl Default for StorageDatetime {
    fn default() -> Self {
        StorageDatetime(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl std::fmt::Display for StorageDatetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

impl From<DateTime<Utc>> for StorageDatetime {
    fn from(dt: DateTime<Utc>) -> Self {
        StorageDatetime(truncate_micros(dt))
    }
}

impl From<StorageDatetime> for DateTime<Utc> {
    fn from(dt: StorageDatetime) -> Self {
        dt.0
    }
}

fn truncate_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}
