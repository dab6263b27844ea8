//! Mutation timestamps for projects.
//!
//! A `Timestamp` is milliseconds since the Unix epoch. It is the sole
//! ordering key for conflict resolution, so locally generated timestamps go
//! through [`Timestamp::tick`], which never returns a value less than or equal
//! to the previous one even if the wall clock stalls or steps backwards.

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Timestamp {
    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(wall_clock_millis())
    }

    /// Creates a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns milliseconds since the epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Generates the next timestamp for a local mutation.
    ///
    /// The result is strictly greater than `self`.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = wall_clock_millis();
        if now > self.0 {
            Self(now)
        } else {
            Self(self.0.saturating_add(1))
        }
    }

    /// Absolute distance between two timestamps in milliseconds.
    #[must_use]
    pub fn abs_diff(&self, other: &Self) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Parses an RFC 3339 string such as `2024-03-01T10:00:00.250Z`.
    pub fn parse_rfc3339(s: &str) -> crate::Result<Self> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| crate::Error::InvalidTimestamp(format!("{s}: {e}")))?;
        let millis = dt.timestamp_millis();
        if millis < 0 {
            return Err(crate::Error::InvalidTimestamp(format!(
                "{s}: before Unix epoch"
            )));
        }
        Ok(Self(millis as u64))
    }

    /// Formats as an RFC 3339 string in UTC.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.0 as i64)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

// Remote stores disagree on the wire format: some send epoch millis, some
// send ISO strings. Accept both.
impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimestampVisitor;

        impl Visitor<'_> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("epoch milliseconds or an RFC 3339 string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
                Ok(Timestamp(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
                u64::try_from(v)
                    .map(Timestamp)
                    .map_err(|_| E::custom("negative timestamp"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
                if v.is_finite() && v >= 0.0 {
                    Ok(Timestamp(v as u64))
                } else {
                    Err(E::custom("timestamp out of range"))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
                Timestamp::parse_rfc3339(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}
