use crate::prelude::{PipelineError, PipelineResult};
use crate::processing::row::SpectrumRow;
use crate::processing::spectrum::{centred_axis_mhz, RawSpectrum};
use std::sync::Arc;

/// Uniform stride sampling: keeps every `floor(len / target_len)`-th value,
/// `target_len` values in total. Trailing values that do not fill a whole
/// stride are dropped; nothing is averaged or interpolated.
pub fn stride_sample(raw: &[f32], target_len: usize) -> PipelineResult<Vec<f32>> {
    if target_len == 0 {
        return Err(PipelineError::InvalidConfig(
            "downsample target must be at least 1".into(),
        ));
    }
    if raw.len() < target_len {
        return Err(PipelineError::MalformedBlock(format!(
            "spectrum has {} bins, fewer than the {} requested",
            raw.len(),
            target_len
        )));
    }
    let stride = raw.len() / target_len;
    Ok(raw.iter().step_by(stride).take(target_len).copied().collect())
}

/// Reduces raw spectra to fixed-width waterfall rows.
pub struct Downsampler {
    target_len: usize,
    axis: Option<((u64, u64), Arc<[f64]>)>,
}

impl Downsampler {
    pub fn new(target_len: usize) -> Self {
        Self {
            target_len,
            axis: None,
        }
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// Builds the row for `raw`. The row's axis spans the full tuned band in
    /// `target_len` evenly spaced points, independent of the stride.
    pub fn downsample(
        &mut self,
        raw: &RawSpectrum,
        sequence: u64,
    ) -> PipelineResult<SpectrumRow> {
        let power_db = stride_sample(&raw.power_db, self.target_len)?;
        let axis = self.axis_for(raw.center_freq_hz, raw.sample_rate_hz);
        SpectrumRow::new(sequence, raw.captured_at, power_db, axis)
    }

    fn axis_for(&mut self, center_freq_hz: f64, sample_rate_hz: f64) -> Arc<[f64]> {
        let key = (center_freq_hz.to_bits(), sample_rate_hz.to_bits());
        if let Some((cached, axis)) = &self.axis {
            if *cached == key {
                return Arc::clone(axis);
            }
        }
        let axis: Arc<[f64]> =
            centred_axis_mhz(center_freq_hz, sample_rate_hz, self.target_len).into();
        self.axis = Some((key, Arc::clone(&axis)));
        axis
    }
}
