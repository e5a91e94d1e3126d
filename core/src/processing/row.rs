use crate::prelude::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One downsampled spectrum: dB power per bin with its frequency axis in MHz.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRow {
    sequence: u64,
    timestamp: DateTime<Utc>,
    power_db: Vec<f32>,
    freq_axis_mhz: Arc<[f64]>,
}

impl SpectrumRow {
    pub fn new(
        sequence: u64,
        timestamp: DateTime<Utc>,
        power_db: Vec<f32>,
        freq_axis_mhz: Arc<[f64]>,
    ) -> PipelineResult<Self> {
        if power_db.len() != freq_axis_mhz.len() {
            return Err(PipelineError::MalformedBlock(format!(
                "{} power bins but {} axis points",
                power_db.len(),
                freq_axis_mhz.len()
            )));
        }
        Ok(Self {
            sequence,
            timestamp,
            power_db,
            freq_axis_mhz,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn power_db(&self) -> &[f32] {
        &self.power_db
    }

    pub fn freq_axis_mhz(&self) -> &[f64] {
        &self.freq_axis_mhz
    }

    /// Shared handle to the (immutable) frequency axis.
    pub fn freq_axis(&self) -> Arc<[f64]> {
        Arc::clone(&self.freq_axis_mhz)
    }

    pub fn len(&self) -> usize {
        self.power_db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power_db.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_axis_is_rejected() {
        let axis: Arc<[f64]> = vec![1.0, 2.0].into();
        assert!(SpectrumRow::new(0, Utc::now(), vec![0.0; 3], axis.clone()).is_err());
        let row = SpectrumRow::new(7, Utc::now(), vec![-1.0, -2.0], axis).unwrap();
        assert_eq!(row.sequence(), 7);
        assert_eq!(row.len(), 2);
    }
}
