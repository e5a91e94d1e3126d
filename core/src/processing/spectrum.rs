use crate::acquisition::SampleBlock;
use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use log::debug;
use std::sync::Arc;

/// Full-resolution, frequency-centred power spectrum of one block.
#[derive(Debug, Clone)]
pub struct RawSpectrum {
    pub power_db: Vec<f32>,
    pub freq_axis_mhz: Arc<[f64]>,
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub captured_at: DateTime<Utc>,
}

impl RawSpectrum {
    pub fn len(&self) -> usize {
        self.power_db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power_db.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisKey {
    len: usize,
    center_freq_hz: f64,
    sample_rate_hz: f64,
}

/// Block -> `20 * log10(|FFT|)` with the spectrum shifted so index 0 is
/// `center - rate / 2`.
///
/// No window is applied before the transform, so strong carriers leak into
/// neighbouring bins.
#[derive(Default)]
pub struct SpectrumTransformer {
    fft: Option<FftHelper>,
    axis: Option<(AxisKey, Arc<[f64]>)>,
}

impl SpectrumTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans the FFT ahead of the first block.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            fft: Some(FftHelper::new(block_size)),
            axis: None,
        }
    }

    pub fn transform(&mut self, block: &SampleBlock) -> PipelineResult<RawSpectrum> {
        if block.is_empty() {
            return Err(PipelineError::MalformedBlock("empty sample block".into()));
        }
        if let Some(position) = block
            .samples()
            .iter()
            .position(|sample| !(sample.re.is_finite() && sample.im.is_finite()))
        {
            return Err(PipelineError::MalformedBlock(format!(
                "non-finite sample at index {position}"
            )));
        }
        let rate = block.sample_rate_hz();
        if rate.is_nan() || rate <= 0.0 {
            return Err(PipelineError::MalformedBlock(format!(
                "sample rate {rate} Hz is not positive"
            )));
        }

        if self.fft.as_ref().map_or(true, |fft| fft.size() != block.len()) {
            debug!("planning FFT for {} samples", block.len());
            self.fft = Some(FftHelper::new(block.len()));
        }
        let fft = self
            .fft
            .as_mut()
            .ok_or_else(|| PipelineError::InvalidConfig("FFT not planned".into()))?;

        let power_db = fft
            .forward_shifted(block.samples())
            .iter()
            .map(|bin| StatsHelper::magnitude_db(bin.norm()))
            .collect();

        Ok(RawSpectrum {
            power_db,
            freq_axis_mhz: self.freq_axis(block),
            center_freq_hz: block.center_freq_hz(),
            sample_rate_hz: block.sample_rate_hz(),
            captured_at: block.captured_at(),
        })
    }

    fn freq_axis(&mut self, block: &SampleBlock) -> Arc<[f64]> {
        let key = AxisKey {
            len: block.len(),
            center_freq_hz: block.center_freq_hz(),
            sample_rate_hz: block.sample_rate_hz(),
        };
        if let Some((cached, axis)) = &self.axis {
            if *cached == key {
                return Arc::clone(axis);
            }
        }
        let axis: Arc<[f64]> =
            centred_axis_mhz(key.center_freq_hz, key.sample_rate_hz, key.len).into();
        self.axis = Some((key, Arc::clone(&axis)));
        axis
    }
}

/// `linspace(center - rate / 2, center + rate / 2, points)` in MHz.
pub fn centred_axis_mhz(center_freq_hz: f64, sample_rate_hz: f64, points: usize) -> Vec<f64> {
    let half = sample_rate_hz / 2.0;
    StatsHelper::linspace(center_freq_hz - half, center_freq_hz + half, points)
        .into_iter()
        .map(|hz| hz / 1e6)
        .collect()
}
