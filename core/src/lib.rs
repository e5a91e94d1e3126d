//! Streaming spectral processing and spike detection for the RF spike scanner.
//!
//! One acquisition thread runs sample block -> power spectrum -> downsampled
//! row -> waterfall -> threshold detection, and hands each detection to
//! background sinks together with a copy of the recent waterfall.

pub mod acquisition;
pub mod dispatch;
pub mod event;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use acquisition::{SampleBlock, SampleSource, SourceSettings};
pub use dispatch::{DetectionDispatcher, DetectionEvent, EventSink};
pub use event::Detection;
pub use pipeline::{Pipeline, PipelineState, ShutdownSignal};
pub use prelude::{
    DispatchConfig, PipelineConfig, PipelineError, PipelineResult, SinkError, SinkResult,
};
