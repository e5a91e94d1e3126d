use rfspikecore::processing::WaterfallSnapshot;
use rfspikecore::Detection;
use serde::{Deserialize, Serialize};

/// JSON body served at `/waterfall`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WaterfallView {
    /// Sequence number of the newest row.
    pub sequence: Option<u64>,
    pub depth: usize,
    pub capacity: usize,
    pub freq_axis_mhz: Vec<f64>,
    /// dB power, oldest row first.
    pub rows: Vec<Vec<f32>>,
    pub latest_detection: Option<Detection>,
    pub frames: u64,
    pub detections: u64,
}

impl WaterfallView {
    pub fn from_snapshot(snapshot: &WaterfallSnapshot) -> Self {
        Self {
            sequence: snapshot.latest().map(|row| row.sequence()),
            depth: snapshot.len(),
            capacity: snapshot.capacity(),
            freq_axis_mhz: snapshot
                .freq_axis()
                .map(|axis| axis.to_vec())
                .unwrap_or_default(),
            rows: snapshot
                .rows()
                .iter()
                .map(|row| row.power_db().to_vec())
                .collect(),
            ..Default::default()
        }
    }
}
