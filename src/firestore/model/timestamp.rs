use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::firestore::codec::ScalarKind;
use crate::firestore::error::{unsupported_value, FirestoreResult};

/// A point in time with nanosecond precision, independent of any time zone.
///
/// Encodes as a native Firestore timestamp when it passes through the document
/// codec and as a `[seconds, nanos]` pair through other serde formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        let mut timestamp = Self { seconds, nanos };
        timestamp.normalize();
        timestamp
    }

    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        Self {
            seconds: duration.as_secs() as i64,
            nanos: duration.subsec_nanos() as i32,
        }
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => Self {
                seconds: duration.as_secs() as i64,
                nanos: duration.subsec_nanos() as i32,
            },
            Err(err) => {
                let duration = err.duration();
                Self::new(
                    -(duration.as_secs() as i64),
                    -(duration.subsec_nanos() as i32),
                )
            }
        }
    }

    pub fn to_system_time(&self) -> SystemTime {
        if self.seconds >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.seconds as u64) + Duration::from_nanos(self.nanos as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.seconds.unsigned_abs()) + Duration::from_nanos(self.nanos as u64)
        }
    }

    /// Parses an RFC 3339 string such as `2024-05-01T12:00:00.5Z`.
    pub fn from_rfc3339(value: &str) -> FirestoreResult<Self> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|err| unsupported_value(format!("Invalid RFC 3339 timestamp '{value}': {err}")))?;
        Ok(Self::from(parsed.with_timezone(&Utc)))
    }

    pub fn to_rfc3339(&self) -> Option<String> {
        self.to_datetime()
            .map(|datetime| datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.seconds, self.nanos as u32)
    }

    /// Folds out-of-range nanoseconds into seconds, saturating at the `i64`
    /// bounds.
    fn normalize(&mut self) {
        let extra_seconds = self.nanos.div_euclid(1_000_000_000) as i64;
        match self.seconds.checked_add(extra_seconds) {
            Some(seconds) => {
                self.seconds = seconds;
                self.nanos = self.nanos.rem_euclid(1_000_000_000);
            }
            None if extra_seconds > 0 => {
                self.seconds = i64::MAX;
                self.nanos = 999_999_999;
            }
            None => {
                self.seconds = i64::MIN;
                self.nanos = 0;
            }
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::new(value.timestamp(), value.timestamp_subsec_nanos() as i32)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.seconds.cmp(&other.seconds) {
            Ordering::Equal => self.nanos.cmp(&other.nanos),
            ordering => ordering,
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_newtype_struct(ScalarKind::Timestamp.token(), &(self.seconds, self.nanos))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a Firestore timestamp")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Timestamp, D::Error>
            where
                D: Deserializer<'de>,
            {
                let (seconds, nanos) = <(i64, i32)>::deserialize(deserializer)?;
                Ok(Timestamp::new(seconds, nanos))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Timestamp, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let seconds = seq
                    .next_element::<i64>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let nanos = seq
                    .next_element::<i32>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Timestamp::new(seconds, nanos))
            }

            fn visit_str<E>(self, value: &str) -> Result<Timestamp, E>
            where
                E: de::Error,
            {
                Timestamp::from_rfc3339(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_newtype_struct(ScalarKind::Timestamp.token(), TimestampVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_nanoseconds() {
        let timestamp = Timestamp::new(1, 1_500_000_000);
        assert_eq!(timestamp.seconds, 2);
        assert_eq!(timestamp.nanos, 500_000_000);
    }

    #[test]
    fn normalize_negative_nanoseconds() {
        let timestamp = Timestamp::new(0, -1);
        assert_eq!(timestamp.seconds, -1);
        assert_eq!(timestamp.nanos, 999_999_999);
    }

    #[test]
    fn normalize_saturates_at_the_bounds() {
        let latest = Timestamp::new(i64::MAX, 1_000_000_000);
        assert_eq!((latest.seconds, latest.nanos), (i64::MAX, 999_999_999));

        let earliest = Timestamp::new(i64::MIN, -1);
        assert_eq!((earliest.seconds, earliest.nanos), (i64::MIN, 0));
        assert!(earliest < Timestamp::new(i64::MIN, 1));
    }

    #[test]
    fn ordering() {
        let earlier = Timestamp::new(1, 0);
        let later = Timestamp::new(2, 0);
        assert!(earlier < later);
    }

    #[test]
    fn rfc3339_conversions() {
        let timestamp = Timestamp::from_rfc3339("2024-05-01T12:00:00.5Z").unwrap();
        assert_eq!(timestamp.seconds, 1_714_564_800);
        assert_eq!(timestamp.nanos, 500_000_000);
        assert_eq!(timestamp.to_rfc3339().unwrap(), "2024-05-01T12:00:00.500Z");
    }

    #[test]
    fn rejects_malformed_rfc3339() {
        let err = Timestamp::from_rfc3339("yesterday").unwrap_err();
        assert_eq!(err.code_str(), "firestore/unsupported-value");
    }

    #[test]
    fn system_time_roundtrip_before_epoch() {
        let timestamp = Timestamp::new(-5, 250);
        assert_eq!(Timestamp::from_system_time(timestamp.to_system_time()), timestamp);
    }
}
