pub mod runner;
pub mod state;

pub use runner::{CycleOutcome, FrameObserver, Pipeline, RunSummary};
pub use state::{PipelineState, ShutdownSignal, StopReason};
