//! A millisecond-precision UTC timestamp, serialized as RFC3339-nano on the
//! wire (Redis-backed persistence, JSON round-trips) and compared as a plain
//! integer in memory.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Milliseconds since the Unix epoch, UTC.
///
/// Constructed from [`std::time::SystemTime`], which on every platform we
/// run on is monotonic enough for "when was this entity last touched"
/// purposes -- we are not relying on it for security-critical ordering.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimestampMs(pub i64);

impl Serialize for TimestampMs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339_nanos())
    }
}

impl<'de> Deserialize<'de> for TimestampMs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_rfc3339_nanos(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid RFC3339 timestamp: {s}")))
    }
}

impl TimestampMs {
    /// The zero timestamp, used as the "never updated" sentinel value for
    /// the rate cache's staleness check.
    pub const ZERO: Self = Self(0);

    /// Returns the current time.
    pub fn now() -> Self {
        let millis = Utc::now().timestamp_millis();
        Self(millis)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Formats this timestamp as RFC3339 with nanosecond precision, e.g.
    /// `"2024-01-01T00:00:00.000000000Z"`. Used for the `timestamp` metadata
    /// value on [`crate::entity::Entity`] and for the `LastUpdatedSentinel`.
    pub fn to_rfc3339_nanos(self) -> String {
        self.to_datetime()
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Parses an RFC3339-nano string previously produced by
    /// [`Self::to_rfc3339_nanos`].
    pub fn from_rfc3339_nanos(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc).timestamp_millis()))
    }

    pub fn saturating_duration_since(self, earlier: Self) -> std::time::Duration {
        let delta_ms = self.0.saturating_sub(earlier.0);
        if delta_ms <= 0 {
            std::time::Duration::ZERO
        } else {
            std::time::Duration::from_millis(delta_ms as u64)
        }
    }

    pub fn checked_add_duration(self, duration: std::time::Duration) -> Option<Self> {
        let millis = i64::try_from(duration.as_millis()).ok()?;
        self.0.checked_add(millis).map(Self)
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339_nanos())
    }
}

impl From<DateTime<Utc>> for TimestampMs {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_nanos_roundtrip() {
        let now = TimestampMs::now();
        let s = now.to_rfc3339_nanos();
        let parsed = TimestampMs::from_rfc3339_nanos(&s).unwrap();
        assert_eq!(now, parsed);
    }

    #[test]
    fn serializes_as_rfc3339_nano_string_not_epoch_millis() {
        let ts = TimestampMs(1_700_000_000_123);
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.starts_with('"'), "expected a JSON string, got {json}");
        let back: TimestampMs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn zero_is_zero() {
        assert!(TimestampMs::ZERO.is_zero());
        assert!(!TimestampMs::now().is_zero());
    }

    #[test]
    fn saturating_duration_since_never_underflows() {
        let earlier = TimestampMs::now();
        let later = TimestampMs(earlier.0 + 1000);
        assert_eq!(
            earlier.saturating_duration_since(later),
            std::time::Duration::ZERO
        );
        assert_eq!(
            later.saturating_duration_since(earlier),
            std::time::Duration::from_millis(1000)
        );
    }
}
