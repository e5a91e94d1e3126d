use chrono::{DateTime, Utc};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tuner gain: automatic gain control or a fixed value in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GainRepr", into = "GainRepr")]
pub enum Gain {
    Auto,
    Db(f32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GainRepr {
    Number(f32),
    Text(String),
}

impl TryFrom<GainRepr> for Gain {
    type Error = String;

    fn try_from(repr: GainRepr) -> Result<Self, Self::Error> {
        match repr {
            GainRepr::Number(db) => Ok(Gain::Db(db)),
            GainRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Gain> for GainRepr {
    fn from(gain: Gain) -> Self {
        match gain {
            Gain::Auto => GainRepr::Text("auto".into()),
            Gain::Db(db) => GainRepr::Number(db),
        }
    }
}

impl FromStr for Gain {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Gain::Auto);
        }
        trimmed
            .parse::<f32>()
            .ok()
            .filter(|db| db.is_finite())
            .map(Gain::Db)
            .ok_or_else(|| format!("gain must be `auto` or a number of dB, got `{value}`"))
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gain::Auto => write!(f, "auto"),
            Gain::Db(db) => write!(f, "{db:.1} dB"),
        }
    }
}

/// Receiver tuning, fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub gain: Gain,
    /// Complex samples per acquired block.
    pub block_size: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            center_freq_hz: 915e6,
            sample_rate_hz: 2.4e6,
            gain: Gain::Auto,
            block_size: 256 * 1024,
        }
    }
}

/// One fixed-size capture of complex samples plus the tuning it was taken with.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    samples: Vec<Complex32>,
    sample_rate_hz: f64,
    center_freq_hz: f64,
    captured_at: DateTime<Utc>,
}

impl SampleBlock {
    pub fn new(samples: Vec<Complex32>, settings: &SourceSettings) -> Self {
        Self::with_timestamp(samples, settings, Utc::now())
    }

    pub fn with_timestamp(
        samples: Vec<Complex32>,
        settings: &SourceSettings,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            samples,
            sample_rate_hz: settings.sample_rate_hz,
            center_freq_hz: settings.center_freq_hz,
            captured_at,
        }
    }

    pub fn samples(&self) -> &[Complex32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn center_freq_hz(&self) -> f64 {
        self.center_freq_hz
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Converts interleaved unsigned 8-bit I/Q (rtl_sdr format) to complex
/// samples in [-1, 1]. A trailing odd byte is ignored.
pub fn cu8_to_complex(bytes: &[u8]) -> Vec<Complex32> {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            Complex32::new(
                (f32::from(pair[0]) - 127.5) / 127.5,
                (f32::from(pair[1]) - 127.5) / 127.5,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_parses_auto_and_numbers() {
        assert_eq!("auto".parse::<Gain>().unwrap(), Gain::Auto);
        assert_eq!("AUTO".parse::<Gain>().unwrap(), Gain::Auto);
        assert_eq!("49.6".parse::<Gain>().unwrap(), Gain::Db(49.6));
        assert!("loud".parse::<Gain>().is_err());
        assert!("NaN".parse::<Gain>().is_err());
    }

    #[test]
    fn gain_deserializes_from_either_form() {
        let auto: Gain = serde_json::from_str("\"auto\"").unwrap();
        let fixed: Gain = serde_json::from_str("20.7").unwrap();
        assert_eq!(auto, Gain::Auto);
        assert_eq!(fixed, Gain::Db(20.7));
        assert_eq!(serde_json::to_string(&Gain::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn cu8_conversion_is_centred() {
        let samples = cu8_to_complex(&[0, 255, 128, 127, 9]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], Complex32::new(-1.0, 1.0));
        assert!(samples[1].re > 0.0 && samples[1].re < 0.01);
        assert!(samples[1].im < 0.0 && samples[1].im > -0.01);
    }

    #[test]
    fn block_carries_tuning() {
        let settings = SourceSettings::default();
        let block = SampleBlock::new(vec![Complex32::new(0.0, 0.0); 4], &settings);
        assert_eq!(block.len(), 4);
        assert_eq!(block.center_freq_hz(), 915e6);
        assert_eq!(block.sample_rate_hz(), 2.4e6);
    }
}
