//! Hardware-backed sample sources.

#[cfg(feature = "hardware")]
pub mod rtlsdr_source;

use crate::workflow::config::SourceConfig;
use rfspikecore::acquisition::SampleSource;

/// The device is opened later, when the pipeline starts.
#[cfg(feature = "hardware")]
pub fn build_rtlsdr(config: &SourceConfig) -> anyhow::Result<Box<dyn SampleSource>> {
    Ok(Box::new(rtlsdr_source::RtlSdrSource::new(
        config.device_index,
        config.ppm_correction,
        config.tuning.clone(),
    )))
}

#[cfg(not(feature = "hardware"))]
pub fn build_rtlsdr(config: &SourceConfig) -> anyhow::Result<Box<dyn SampleSource>> {
    log::warn!(
        "RTL-SDR device {} requested but hardware support is not compiled in",
        config.device_index
    );
    anyhow::bail!("RTL-SDR support requires building with `--features hardware`")
}
