//! UTC instants and the renderings used in file and directory names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// UTC instant. Serializes as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Millisecond precision with a `Z` suffix, as written into manifests.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }

    /// `2026-10-15T09-30-00`: ISO 8601 without colons.
    pub fn to_file_stamp(&self) -> String {
        self.0.format("%Y-%m-%dT%H-%M-%S").to_string()
    }

    /// `20261015-093000`, appended to backup directory names.
    pub fn to_backup_suffix(&self) -> String {
        self.0.format("%Y%m%d-%H%M%S").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 5).unwrap())
    }

    #[test]
    fn test_name_safe_renderings() {
        let ts = fixed();
        assert_eq!(ts.to_file_stamp(), "2026-10-15T09-30-05");
        assert_eq!(ts.to_backup_suffix(), "20261015-093005");
        assert!(!ts.to_file_stamp().contains(':'));
    }

    #[test]
    fn test_manifest_rendering() {
        assert_eq!(fixed().to_string(), "2026-10-15T09:30:05.000Z");
    }

    #[test]
    fn test_json_keeps_the_instant() {
        let ts = fixed();
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
