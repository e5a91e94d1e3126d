//! Detection sinks wired up by the scanner binary.

pub mod cot;
pub mod csv_log;
pub mod kml;
pub mod marker;
pub mod relay;
pub mod snapshot;

pub use cot::CotRelaySink;
pub use csv_log::CsvLogSink;
pub use kml::KmlMarkerSink;
pub use marker::MarkerFields;
pub use relay::ScpRelay;
pub use snapshot::SnapshotSink;

use rfspikecore::SinkResult;
use std::path::Path;

/// Forwards a finished artifact to another host.
pub trait FileRelay: Send + Sync {
    fn name(&self) -> &str;

    fn transfer(&self, path: &Path) -> SinkResult<()>;
}

pub(crate) fn encoding_error<E: std::fmt::Display>(err: E) -> rfspikecore::SinkError {
    rfspikecore::SinkError::Encoding(err.to_string())
}
