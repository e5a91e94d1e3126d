use log::info;
use num_complex::Complex32;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rfspikecore::acquisition::{SampleBlock, SampleSource, SourceSettings};
use rfspikecore::prelude::DeviceError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

/// Configuration for generating synthetic IQ blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Peak amplitude of the uniform noise on I and Q.
    pub noise: f32,
    /// Carrier offset from the centre frequency.
    pub tone_offset_hz: f64,
    pub tone_amplitude: f32,
    /// The carrier is present in every `burst_every`-th block; 0 disables it.
    pub burst_every: u64,
    pub seed: u64,
    /// Sleep for the real-time duration of each block.
    pub realtime: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            noise: 0.02,
            tone_offset_hz: 150e3,
            tone_amplitude: 0.5,
            burst_every: 10,
            seed: 0,
            realtime: true,
        }
    }
}

impl GeneratorConfig {
    fn burst_in(&self, block_index: u64) -> bool {
        self.burst_every > 0 && (block_index + 1) % self.burst_every == 0
    }
}

fn build_sample_vector(
    config: &GeneratorConfig,
    settings: &SourceSettings,
    rng: &mut StdRng,
    with_tone: bool,
    start_sample: u64,
) -> Vec<Complex32> {
    let step = 2.0 * PI * config.tone_offset_hz / settings.sample_rate_hz;
    let noise = config.noise.abs();

    (0..settings.block_size)
        .map(|idx| {
            let mut sample = if noise > 0.0 {
                Complex32::new(rng.gen_range(-noise..noise), rng.gen_range(-noise..noise))
            } else {
                Complex32::new(0.0, 0.0)
            };
            if with_tone {
                let phase = (step * (start_sample + idx as u64) as f64) % (2.0 * PI);
                sample += Complex32::from_polar(config.tone_amplitude, phase as f32);
            }
            sample
        })
        .collect()
}

/// Noise source with a carrier that appears at a fixed cadence.
pub struct SyntheticSource {
    config: GeneratorConfig,
    settings: SourceSettings,
    rng: StdRng,
    blocks: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(config: GeneratorConfig, settings: SourceSettings) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            settings,
            rng,
            blocks: 0,
            open: false,
        }
    }

    fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.settings.block_size as f64 / self.settings.sample_rate_hz)
    }
}

impl SampleSource for SyntheticSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        if self.settings.block_size == 0 {
            return Err(DeviceError::Config("block size must be at least 1".into()));
        }
        if !(self.settings.sample_rate_hz.is_finite() && self.settings.sample_rate_hz > 0.0) {
            return Err(DeviceError::Config(format!(
                "sample rate {} Hz is not usable",
                self.settings.sample_rate_hz
            )));
        }
        info!(
            "synthetic source: carrier {:+.1} kHz every {} blocks, seed {}",
            self.config.tone_offset_hz / 1e3,
            self.config.burst_every,
            self.config.seed
        );
        self.open = true;
        Ok(())
    }

    fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
        if !self.open {
            return Err(DeviceError::Disconnected("synthetic source is closed".into()));
        }
        if self.config.realtime {
            thread::sleep(self.block_duration());
        }
        let with_tone = self.config.burst_in(self.blocks);
        let start = self.blocks * self.settings.block_size as u64;
        let samples =
            build_sample_vector(&self.config, &self.settings, &mut self.rng, with_tone, start);
        self.blocks += 1;
        Ok(SampleBlock::new(samples, &self.settings))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn settings(&self) -> &SourceSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SourceSettings {
        SourceSettings {
            block_size: 2048,
            ..Default::default()
        }
    }

    fn fast(burst_every: u64) -> GeneratorConfig {
        GeneratorConfig {
            burst_every,
            realtime: false,
            seed: 13,
            ..Default::default()
        }
    }

    fn energy(block: &SampleBlock) -> f32 {
        block.samples().iter().map(|s| s.norm_sqr()).sum::<f32>() / block.len() as f32
    }

    #[test]
    fn generator_builds_expected_sample_count() {
        let mut source = SyntheticSource::new(fast(0), settings());
        source.open().unwrap();
        let block = source.acquire().unwrap();
        assert_eq!(block.len(), 2048);
        assert_eq!(block.center_freq_hz(), 915e6);
        assert!(block
            .samples()
            .iter()
            .all(|s| s.re.abs() <= 0.02 && s.im.abs() <= 0.02));
    }

    #[test]
    fn carrier_appears_on_cadence() {
        let mut source = SyntheticSource::new(fast(3), settings());
        source.open().unwrap();
        let energies: Vec<f32> = (0..6).map(|_| energy(&source.acquire().unwrap())).collect();
        for (idx, value) in energies.iter().enumerate() {
            if idx % 3 == 2 {
                assert!(*value > 0.2, "block {idx} should carry the tone");
            } else {
                assert!(*value < 0.01, "block {idx} should be noise only");
            }
        }
    }

    #[test]
    fn same_seed_repeats() {
        let mut a = SyntheticSource::new(fast(2), settings());
        let mut b = SyntheticSource::new(fast(2), settings());
        a.open().unwrap();
        b.open().unwrap();
        assert_eq!(a.acquire().unwrap().samples(), b.acquire().unwrap().samples());
    }

    #[test]
    fn closed_source_refuses_to_acquire() {
        let mut source = SyntheticSource::new(fast(1), settings());
        assert!(matches!(source.acquire(), Err(DeviceError::Disconnected(_))));
        source.open().unwrap();
        source.close();
        assert!(source.acquire().is_err());
    }
}
