use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Processing parameters shared by every stage of the acquisition cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of output bins per waterfall row.
    pub resolution: usize,
    /// Maximum number of rows kept in the waterfall history.
    pub depth: usize,
    /// Spike threshold in dB. Read-only for the lifetime of the process.
    pub threshold_db: f32,
    /// Stop after this many acquisition cycles (unbounded when `None`).
    pub max_cycles: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: 1024,
            depth: 100,
            threshold_db: -40.0,
            max_cycles: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.resolution == 0 {
            return Err(PipelineError::InvalidConfig(
                "resolution must be at least 1".into(),
            ));
        }
        if self.depth == 0 {
            return Err(PipelineError::InvalidConfig(
                "waterfall depth must be at least 1".into(),
            ));
        }
        if self.threshold_db.is_nan() {
            return Err(PipelineError::InvalidConfig(
                "threshold must be a number".into(),
            ));
        }
        Ok(())
    }
}

/// Limits applied to background sink work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Sink invocations allowed to run at the same time.
    pub max_concurrent: usize,
    /// Invocations allowed to be queued or running before new ones are dropped.
    pub max_pending: usize,
    /// Upper bound for a single sink invocation.
    #[serde(with = "secs")]
    pub sink_timeout: Duration,
    /// Time given to in-flight sink work once the pipeline starts draining.
    #[serde(with = "secs")]
    pub drain_grace: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_pending: 64,
            sink_timeout: Duration::from_secs(30),
            drain_grace: Duration::from_secs(5),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Failures raised by a sample source. Any variant other than
/// `EndOfStream` is fatal to the process.
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("failed to open device: {0}")]
    Open(String),
    #[error("invalid device configuration: {0}")]
    Config(String),
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("device read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("sample stream exhausted")]
    EndOfStream,
}

/// Errors produced while running the acquisition pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("malformed sample block: {0}")]
    MalformedBlock(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Whether the acquisition loop may skip the current cycle and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::MalformedBlock(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors reported by event sinks. They never leave the sink task.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type SinkResult<T> = Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_scan_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.resolution, 1024);
        assert_eq!(config.depth, 100);
        assert_eq!(config.threshold_db, -40.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let config = PipelineConfig {
            depth: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn only_malformed_blocks_are_recoverable() {
        assert!(PipelineError::MalformedBlock("short".into()).is_recoverable());
        assert!(!PipelineError::Device(DeviceError::EndOfStream).is_recoverable());
    }

    #[test]
    fn dispatch_config_reads_seconds() {
        let config: DispatchConfig =
            serde_json::from_str(r#"{"sink_timeout": 2.5, "drain_grace": 1}"#).unwrap();
        assert_eq!(config.sink_timeout, Duration::from_millis(2500));
        assert_eq!(config.drain_grace, Duration::from_secs(1));
        assert_eq!(config.max_concurrent, 4);
    }
}
