use crate::dashboard::DashboardBridge;
use crate::device::build_rtlsdr;
use crate::generator::profile::SyntheticSource;
use crate::location::{self, ResolvedLocation};
use crate::sinks::{CotRelaySink, CsvLogSink, FileRelay, KmlMarkerSink, ScpRelay, SnapshotSink};
use crate::workflow::config::{ScannerConfig, SourceKind};
use anyhow::Context;
use log::{info, warn};
use rfspikecore::acquisition::{IqFileSource, SampleSource};
use rfspikecore::pipeline::RunSummary;
use rfspikecore::telemetry::MetricsRecorder;
use rfspikecore::{DetectionDispatcher, EventSink, Pipeline, ShutdownSignal};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Wires a [`ScannerConfig`] into a running pipeline: source, sinks,
/// location and the optional dashboard.
#[derive(Clone)]
pub struct Runner {
    config: ScannerConfig,
}

impl Runner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn build_source(&self) -> anyhow::Result<Box<dyn SampleSource>> {
        let source = &self.config.source;
        let built: Box<dyn SampleSource> = match source.kind {
            SourceKind::Rtlsdr => build_rtlsdr(source)?,
            SourceKind::File => {
                let path = source
                    .path
                    .clone()
                    .context("the file source needs an input path")?;
                Box::new(IqFileSource::new(path, source.tuning.clone(), source.repeat))
            }
            SourceKind::Synthetic => Box::new(SyntheticSource::new(
                source.synthetic.clone(),
                source.tuning.clone(),
            )),
        };
        info!("sample source: {}", built.describe());
        Ok(built)
    }

    pub fn build_sinks(&self, location: &ResolvedLocation) -> anyhow::Result<Vec<Arc<dyn EventSink>>> {
        let output = &self.config.output;
        let dir = &output.detections_dir;
        let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();

        let csv_path = output.csv_path();
        let csv_location = location.configured.then_some(location.coordinates);
        let csv = CsvLogSink::create(&csv_path, csv_location)
            .with_context(|| format!("opening detection log {}", csv_path.display()))?;
        sinks.push(Arc::new(csv));

        if output.snapshots {
            sinks.push(Arc::new(SnapshotSink::new(dir.clone())));
        }

        if output.kml {
            let mut kml = KmlMarkerSink::new(dir.clone(), location.coordinates);
            if let Some(upload) = &output.upload {
                let relay: Arc<dyn FileRelay> = Arc::new(
                    ScpRelay::from_config(upload).context("configuring marker upload")?,
                );
                info!(
                    "markers will be uploaded to {}@{}:{}",
                    upload.username, upload.host, upload.remote_dir
                );
                kml = kml.with_relay(relay);
            }
            sinks.push(Arc::new(kml));
        } else if output.upload.is_some() {
            warn!("upload is configured but KML markers are disabled; nothing will be uploaded");
        }

        if let Some(cot) = &output.cot {
            info!("CoT events will be sent to {}", cot.target);
            sinks.push(Arc::new(CotRelaySink::new(cot, location.coordinates)));
        }

        Ok(sinks)
    }

    /// Runs the pipeline on the calling thread until it stops. Sink work and
    /// the dashboard run on `runtime`.
    pub fn execute(&self, runtime: &Handle, shutdown: ShutdownSignal) -> anyhow::Result<RunSummary> {
        let location = location::resolve(&self.config.location, runtime);
        let source = self.build_source()?;

        let metrics = Arc::new(MetricsRecorder::new());
        let mut dispatcher = DetectionDispatcher::new(
            runtime.clone(),
            self.config.dispatch.clone(),
            Arc::clone(&metrics),
        );
        for sink in self.build_sinks(&location)? {
            dispatcher.add_sink(sink);
        }
        info!("sinks: {}", dispatcher.sink_names().join(", "));

        let mut pipeline = Pipeline::new(
            self.config.pipeline.clone(),
            source,
            dispatcher,
            metrics,
            shutdown,
        )
        .context("configuring pipeline")?
        .with_drain_grace(self.config.dispatch.drain_grace);

        if self.config.dashboard.enabled {
            let bridge = DashboardBridge::new();
            bridge
                .serve(
                    runtime,
                    &self.config.dashboard,
                    &self.config.output.detections_dir,
                )
                .context("starting dashboard")?;
            pipeline = pipeline.with_observer(Arc::new(bridge));
        }

        pipeline.run().context("acquisition stopped with an error")
    }
}
