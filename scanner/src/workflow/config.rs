use anyhow::Context;
use clap::ValueEnum;
use rfspikecore::acquisition::{Gain, SourceSettings};
use rfspikecore::prelude::{DispatchConfig, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generator::profile::GeneratorConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// RTL-SDR dongle (requires the `hardware` feature)
    Rtlsdr,
    /// Replay of an rtl_sdr `.cu8` capture
    File,
    /// Generated noise with periodic carrier bursts
    Synthetic,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub tuning: SourceSettings,
    pub device_index: u32,
    pub ppm_correction: i32,
    pub path: Option<PathBuf>,
    pub repeat: bool,
    pub synthetic: GeneratorConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Rtlsdr,
            tuning: SourceSettings::default(),
            device_index: 0,
            ppm_correction: 0,
            path: None,
            repeat: false,
            synthetic: GeneratorConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CotConfig {
    /// `host:port` of the TAK server or multicast group.
    pub target: String,
    pub uid: String,
    pub stale_secs: i64,
}

impl Default for CotConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1:4242".into(),
            uid: "rf-sensor-001".into(),
            stale_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Environment variable holding the password.
    pub password_env: String,
    pub remote_dir: String,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password_env: "RFSPIKE_SCP_PASSWORD".into(),
            remote_dir: "uploads".into(),
            connect_timeout_secs: 10,
            io_timeout_secs: 20,
            max_attempts: 2,
        }
    }
}

impl UploadConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub detections_dir: PathBuf,
    /// Defaults to `<detections_dir>/detections_log.csv`.
    pub csv_file: Option<PathBuf>,
    pub snapshots: bool,
    pub kml: bool,
    pub cot: Option<CotConfig>,
    pub upload: Option<UploadConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            detections_dir: PathBuf::from("detections"),
            csv_file: None,
            snapshots: true,
            kml: true,
            cot: None,
            upload: None,
        }
    }
}

impl OutputConfig {
    pub fn csv_path(&self) -> PathBuf {
        self.csv_file
            .clone()
            .unwrap_or_else(|| self.detections_dir.join("detections_log.csv"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    /// No location columns; markers use the fallback coordinate
    None,
    Static,
    Geoip,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub mode: LocationMode,
    pub latitude: f64,
    pub longitude: f64,
    pub geoip_url: String,
    pub timeout_secs: u64,
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            mode: LocationMode::None,
            latitude: 37.823,
            longitude: -122.441,
            geoip_url: "http://ip-api.com/json/".into(),
            timeout_secs: 5,
            fallback_latitude: 37.823,
            fallback_longitude: -122.441,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
    pub max_snapshots: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            max_snapshots: 10,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub dispatch: DispatchConfig,
    pub output: OutputConfig,
    pub location: LocationConfig,
    pub dashboard: DashboardConfig,
}

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub source: Option<SourceKind>,
    pub input: Option<PathBuf>,
    pub center_freq_hz: Option<f64>,
    pub sample_rate_hz: Option<f64>,
    pub gain: Option<Gain>,
    pub threshold_db: Option<f32>,
    pub max_cycles: Option<u64>,
    pub detections_dir: Option<PathBuf>,
    pub dashboard: bool,
}

impl ScannerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading scanner config {}", path_ref.display()))?;
        let config: ScannerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing scanner config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(kind) = overrides.source {
            self.source.kind = kind;
        }
        if let Some(path) = overrides.input {
            self.source.path = Some(path);
            if overrides.source.is_none() {
                self.source.kind = SourceKind::File;
            }
        }
        if let Some(hz) = overrides.center_freq_hz {
            self.source.tuning.center_freq_hz = hz;
        }
        if let Some(hz) = overrides.sample_rate_hz {
            self.source.tuning.sample_rate_hz = hz;
        }
        if let Some(gain) = overrides.gain {
            self.source.tuning.gain = gain;
        }
        if let Some(threshold) = overrides.threshold_db {
            self.pipeline.threshold_db = threshold;
        }
        if overrides.max_cycles.is_some() {
            self.pipeline.max_cycles = overrides.max_cycles;
        }
        if let Some(dir) = overrides.detections_dir {
            self.output.detections_dir = dir;
        }
        if overrides.dashboard {
            self.dashboard.enabled = true;
        }
    }
}
