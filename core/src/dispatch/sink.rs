use crate::event::Detection;
use crate::prelude::SinkResult;
use crate::processing::WaterfallSnapshot;
use std::sync::Arc;

/// Everything a sink receives for one detection. All fields are owned or
/// immutable; nothing here aliases the live waterfall.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub detection: Detection,
    pub waterfall: Arc<WaterfallSnapshot>,
    pub freq_axis_mhz: Arc<[f64]>,
}

/// External consumer of detections (log, export, relay).
///
/// `handle` runs on a blocking worker thread, never on the acquisition
/// thread. Errors are logged by the dispatcher and otherwise ignored.
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, event: &DetectionEvent) -> SinkResult<()>;
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn handle(&self, event: &DetectionEvent) -> SinkResult<()> {
        (**self).handle(event)
    }
}
