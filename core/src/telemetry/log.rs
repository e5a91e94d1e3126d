use crate::event::Detection;
use crate::math::stats::StatsHelper;
use crate::processing::SpectrumRow;
use log::{debug, info};

/// Row statistics are logged once every this many rows.
const ROW_LOG_INTERVAL: u64 = 30;

/// Scoped logger for pipeline records. Every line carries the scope name.
pub struct LogManager {
    scope: &'static str,
}

impl LogManager {
    pub fn new(scope: &'static str) -> Self {
        Self { scope }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.scope, message);
    }

    pub fn record_row(&self, row: &SpectrumRow) {
        if row.sequence() % ROW_LOG_INTERVAL != 0 {
            return;
        }
        if let Some((min, max, mean)) = StatsHelper::min_max_mean(row.power_db()) {
            debug!(
                "[{}] row {}: {} bins, dB range {:.1} to {:.1} (mean {:.1})",
                self.scope,
                row.sequence(),
                row.len(),
                min,
                max,
                mean
            );
        }
    }

    pub fn record_detection(&self, detection: &Detection) {
        info!(
            "[{}] spike at {:.3} MHz, {:.2} dB (row {}, bin {})",
            self.scope,
            detection.frequency_mhz,
            detection.power_db,
            detection.source_row_index,
            detection.bin_index
        );
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("pipeline")
    }
}
