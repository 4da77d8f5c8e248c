use std::fmt;
use std::num::ParseIntError;
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{Duration, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

pub fn now() -> Timestamp {
    Timestamp(Utc::now().timestamp_millis())
}

/// Events older than this are eligible for purge.
pub fn retention_window() -> Duration {
    Duration::hours(24)
}

/// The rolling window reported by hourly statistics.
pub fn hourly_window() -> Duration {
    Duration::hours(1)
}

/// Milliseconds since the unix epoch.
///
/// The backend hands list entries back as strings, so deserialization
/// accepts both integer and string encodings; comparisons always happen on
/// the integer form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, new)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn millis(self) -> i64 {
        self.0
    }

    /// Whether this timestamp is newer than `now - window`.
    pub fn is_within(self, window: Duration, now: Timestamp) -> bool {
        self.0 > now.0 - window.num_milliseconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl FromStr for Timestamp {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration::milliseconds(self.0 - rhs.0)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self(self.0 - rhs.num_milliseconds())
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.num_milliseconds())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

struct TimestampVisitor;

impl serde::de::Visitor<'_> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("milliseconds since the epoch, as an integer or a string")
    }

    fn visit_i64<E: serde::de::Error>(self, millis: i64) -> Result<Self::Value, E> {
        Ok(Timestamp(millis))
    }

    fn visit_u64<E: serde::de::Error>(self, millis: u64) -> Result<Self::Value, E> {
        i64::try_from(millis)
            .map(Timestamp)
            .map_err(|_| E::custom(format!("timestamp {millis} is out of range")))
    }

    fn visit_str<E: serde::de::Error>(self, encoded: &str) -> Result<Self::Value, E> {
        encoded.parse().map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_integer_and_string_encodings() {
        let from_int: Timestamp = serde_json::from_str("1700000000000").unwrap();
        let from_str: Timestamp = serde_json::from_str("\"1700000000000\"").unwrap();

        assert_eq!(
            from_int, from_str,
            "both encodings should normalize to the same instant"
        );
        assert_eq!(from_int.millis(), 1_700_000_000_000);
    }

    #[test]
    fn rejects_garbage() {
        let result: Result<Timestamp, _> = serde_json::from_str("\"yesterday\"");
        assert!(result.is_err());
    }

    #[test]
    fn serializes_as_integer() {
        let encoded = serde_json::to_string(&Timestamp::new(42)).unwrap();
        assert_eq!(encoded, "42");
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let now = now();
        let window = hourly_window();

        assert!(Timestamp::new(now.millis() - 1).is_within(window, now));
        assert!(
            !(now - window).is_within(window, now),
            "an entry exactly one window old has already aged out"
        );
    }

    #[test]
    fn subtraction_yields_duration() {
        let earlier = Timestamp::new(1_000);
        let later = Timestamp::new(61_000);

        assert_eq!(later - earlier, Duration::seconds(60));
    }
}
