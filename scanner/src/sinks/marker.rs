use crate::location::Coordinates;
use chrono::{DateTime, Utc};
use rfspikecore::Detection;

/// The fields a geographic marker carries, shared by the KML and CoT
/// encoders and recovered by their parsers.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerFields {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub frequency_mhz: f64,
    pub power_db: f32,
}

impl MarkerFields {
    pub fn from_detection(detection: &Detection, position: Coordinates) -> Self {
        Self {
            timestamp: detection.timestamp,
            latitude: position.latitude,
            longitude: position.longitude,
            frequency_mhz: detection.frequency_mhz,
            power_db: detection.power_db,
        }
    }

    pub fn position(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Short human label, e.g. `RF 915.12MHz -12.50dB`.
    pub fn label(&self) -> String {
        format!("RF {:.2}MHz {:.2}dB", self.frequency_mhz, self.power_db)
    }
}
