use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Upper bound accepted for any configured duration (100 years).
pub const MAX_INTERVAL_SECS: u64 = 100 * 365 * 86400;

/// A non-negative span of time written in config as `"10m"`, `"1h"`, `"7d"`, `"30s"`
/// or raw seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval(u64);

impl Interval {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn from_mins(mins: u64) -> Self {
        Self(mins * 60)
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self(hours * 3600)
    }

    pub const fn from_days(days: u64) -> Self {
        Self(days * 86400)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_std(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    /// For timestamp arithmetic against stored `DateTime<Utc>` values.
    /// Saturates at `TimeDelta::MAX`.
    pub fn as_chrono(&self) -> TimeDelta {
        i64::try_from(self.0)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// `at - self`, clamped to the earliest representable instant.
    pub fn before(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.checked_sub_signed(self.as_chrono())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// `at + self`, clamped to the latest representable instant.
    pub fn after(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.checked_add_signed(self.as_chrono())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Parse interval string like "1h", "30m", "6h", "1d"
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600, "hours")
    } else if let Some(minutes) = s.strip_suffix('m') {
        scaled(minutes, 60, "minutes")
    } else if let Some(days) = s.strip_suffix('d') {
        scaled(days, 86400, "days")
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))
    }
}

fn scaled(value: &str, unit: u64, name: &str) -> Result<u64, String> {
    let n = value
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", name, value))?;
    n.checked_mul(unit)
        .ok_or_else(|| format!("Interval too large: {}{}", value, &name[..1]))
}

/// Format interval for display
pub fn format_interval(secs: u64) -> String {
    if secs >= 86400 && secs % 86400 == 0 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_interval(self.0))
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_interval(s).map(Interval)
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_interval(self.0))
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Interval(secs)),
            Raw::Text(text) => parse_interval(&text)
                .map(Interval)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("30m").unwrap(), 1800);
        assert_eq!(parse_interval("1d").unwrap(), 86400);
        assert_eq!(parse_interval("60s").unwrap(), 60);
        assert_eq!(parse_interval("3600").unwrap(), 3600);
        assert_eq!(parse_interval(" 6H ").unwrap(), 21600);
        assert!(parse_interval("invalid").is_err());
        assert!(parse_interval("-5m").is_err());
    }

    #[test]
    fn test_parse_interval_rejects_overflow() {
        assert!(parse_interval("10000000000000000d").is_err());
        assert!(parse_interval("18446744073709551615h").is_err());
        assert!(parse_interval("18446744073709551615m").is_err());
        assert_eq!(
            parse_interval("18446744073709551615s").unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn test_huge_interval_saturates() {
        let huge = Interval::from_secs(10_000_000_000_000_000);
        assert_eq!(huge.as_chrono(), TimeDelta::MAX);
        assert_eq!(Interval::from_secs(u64::MAX).as_chrono(), TimeDelta::MAX);

        let now = Utc::now();
        assert_eq!(huge.before(now), DateTime::<Utc>::MIN_UTC);
        assert_eq!(huge.after(now), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            Interval::from_days(1).before(now),
            now - TimeDelta::days(1)
        );
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(3600), "1h");
        assert_eq!(format_interval(1800), "30m");
        assert_eq!(format_interval(86400), "1d");
        assert_eq!(format_interval(90), "90s");
        assert_eq!(format_interval(7200), "2h");
        assert_eq!(format_interval(0), "0s");
    }

    #[test]
    fn test_deserialize_text_and_number() {
        #[derive(Deserialize)]
        struct Wrapper {
            a: Interval,
            b: Interval,
        }

        let parsed: Wrapper = toml::from_str("a = \"7d\"\nb = 45\n").unwrap();
        assert_eq!(parsed.a, Interval::from_days(7));
        assert_eq!(parsed.b, Interval::from_secs(45));
        assert_eq!(parsed.a.as_chrono(), chrono::Duration::days(7));
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Wrapper {
            a: Interval,
        }

        assert!(toml::from_str::<Wrapper>("a = \"soon\"").is_err());
    }
}
