use crate::event::Detection;
use crate::processing::row::SpectrumRow;

/// Returns the first (lowest-frequency) bin of `row` whose power is strictly
/// above `threshold_db`. Stronger bins later in the row are not considered,
/// and at most one detection is produced per row.
pub fn detect(row: &SpectrumRow, threshold_db: f32) -> Option<Detection> {
    let (bin, &power_db) = row
        .power_db()
        .iter()
        .enumerate()
        .find(|&(_, &power)| power > threshold_db)?;
    Some(Detection::new(
        row.timestamp(),
        row.freq_axis_mhz()[bin],
        power_db,
        row.sequence(),
        bin,
    ))
}

/// Threshold detector bound to the process-wide threshold.
#[derive(Debug, Clone, Copy)]
pub struct SpikeDetector {
    threshold_db: f32,
}

impl SpikeDetector {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn detect(&self, row: &SpectrumRow) -> Option<Detection> {
        detect(row, self.threshold_db)
    }
}
