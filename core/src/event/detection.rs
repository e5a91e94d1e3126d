use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A single spike found in one waterfall row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub timestamp: DateTime<Utc>,
    pub frequency_mhz: f64,
    pub power_db: f32,
    /// Sequence number of the row the spike was found in.
    pub source_row_index: u64,
    /// Bin within that row.
    pub bin_index: usize,
}

impl Detection {
    pub fn new(
        timestamp: DateTime<Utc>,
        frequency_mhz: f64,
        power_db: f32,
        source_row_index: u64,
        bin_index: usize,
    ) -> Self {
        Self {
            timestamp,
            frequency_mhz,
            power_db,
            source_row_index,
            bin_index,
        }
    }

    /// RFC 3339 UTC timestamp with a `Z` suffix, e.g. `2024-05-01T12:00:00Z`.
    /// Sub-second digits are kept when present.
    pub fn rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// Filesystem-safe stamp, unique per detection.
    pub fn file_stamp(&self) -> String {
        format!(
            "{}_{}",
            self.timestamp.format("%Y-%m-%dT%H-%M-%S%.3fZ"),
            self.source_row_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Detection {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        Detection::new(timestamp, 915.123, -12.5, 42, 500)
    }

    #[test]
    fn timestamp_formats() {
        let detection = sample();
        assert_eq!(detection.rfc3339(), "2024-05-01T12:30:05Z");
        assert_eq!(detection.file_stamp(), "2024-05-01T12-30-05.000Z_42");
        assert!(!detection.file_stamp().contains(':'));
    }

    #[test]
    fn sub_second_precision_is_kept() {
        let mut detection = sample();
        detection.timestamp += chrono::Duration::milliseconds(250);
        assert_eq!(detection.rfc3339(), "2024-05-01T12:30:05.250Z");
    }

    #[test]
    fn serializes_timestamp_as_rfc3339() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T12:30:05Z");
        assert_eq!(value["source_row_index"], 42);
    }
}
