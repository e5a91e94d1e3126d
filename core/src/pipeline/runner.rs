use crate::acquisition::SampleSource;
use crate::dispatch::{DetectionDispatcher, DrainReport};
use crate::event::Detection;
use crate::pipeline::state::{PipelineState, ShutdownSignal, StopReason};
use crate::prelude::{DeviceError, PipelineConfig, PipelineError, PipelineResult};
use crate::processing::{
    Downsampler, SpectrumTransformer, SpikeDetector, WaterfallBuffer, WaterfallSnapshot,
};
use crate::telemetry::{LogManager, MetricsRecorder, MetricsSnapshot};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Read-only consumer of the waterfall (e.g. a live display). Receives a
/// snapshot after every completed cycle.
pub trait FrameObserver: Send + Sync {
    fn observe(&self, waterfall: Arc<WaterfallSnapshot>, detection: Option<&Detection>);
}

/// Result of one acquisition cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub sequence: u64,
    pub detection: Option<Detection>,
    pub dispatched: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub metrics: MetricsSnapshot,
    pub drain: DrainReport,
}

/// Acquisition loop and the state it owns: source, stages, waterfall and
/// dispatcher. Runs on the calling thread.
pub struct Pipeline<S: SampleSource> {
    state: PipelineState,
    config: PipelineConfig,
    source: S,
    transformer: SpectrumTransformer,
    downsampler: Downsampler,
    waterfall: WaterfallBuffer,
    detector: SpikeDetector,
    dispatcher: DetectionDispatcher,
    observer: Option<Arc<dyn FrameObserver>>,
    shutdown: ShutdownSignal,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
    drain_grace: Duration,
    next_sequence: u64,
}

impl<S: SampleSource> Pipeline<S> {
    pub fn new(
        config: PipelineConfig,
        source: S,
        dispatcher: DetectionDispatcher,
        metrics: Arc<MetricsRecorder>,
        shutdown: ShutdownSignal,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let block_size = source.settings().block_size;
        if block_size < config.resolution {
            return Err(PipelineError::InvalidConfig(format!(
                "block size {} is smaller than the resolution {}",
                block_size, config.resolution
            )));
        }

        Ok(Self {
            state: PipelineState::Starting,
            transformer: SpectrumTransformer::with_block_size(block_size),
            downsampler: Downsampler::new(config.resolution),
            waterfall: WaterfallBuffer::new(config.depth),
            detector: SpikeDetector::new(config.threshold_db),
            config,
            source,
            dispatcher,
            observer: None,
            shutdown,
            metrics,
            logger: LogManager::new("pipeline"),
            drain_grace: Duration::from_secs(5),
            next_sequence: 0,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn waterfall(&self) -> &WaterfallBuffer {
        &self.waterfall
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Sequence number of the most recently acquired block, including a
    /// block whose cycle was later skipped.
    pub fn last_sequence(&self) -> Option<u64> {
        self.next_sequence.checked_sub(1)
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!("pipeline {} -> {}", self.state, next);
        self.state = next;
    }

    /// `Starting -> Running`: opens the device. A failure here is fatal and
    /// leaves the pipeline `Stopped`.
    pub fn start(&mut self) -> PipelineResult<()> {
        if self.state != PipelineState::Starting {
            return Err(PipelineError::InvalidConfig(format!(
                "cannot start a pipeline that is {}",
                self.state
            )));
        }
        if let Err(err) = self.source.open() {
            error!("device open failed: {}", err);
            self.transition(PipelineState::Stopped);
            return Err(err.into());
        }
        self.logger.record(&format!(
            "acquiring {}, {} bins x {} rows, threshold {:.1} dB, sinks {:?}",
            self.source.describe(),
            self.config.resolution,
            self.config.depth,
            self.detector.threshold_db(),
            self.dispatcher.sink_names()
        ));
        self.transition(PipelineState::Running);
        Ok(())
    }

    /// One acquisition cycle: acquire, transform, downsample, push, detect,
    /// dispatch. Never waits for sinks.
    pub fn step(&mut self) -> PipelineResult<CycleOutcome> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::InvalidConfig(format!(
                "cannot acquire while {}",
                self.state
            )));
        }

        let block = self.source.acquire()?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let raw = self.transformer.transform(&block)?;
        let row = self.downsampler.downsample(&raw, sequence)?;
        self.logger.record_row(&row);
        let freq_axis = row.freq_axis();
        self.waterfall.push(row);
        self.metrics.record_cycle();

        let detection = self
            .waterfall
            .latest()
            .and_then(|row| self.detector.detect(row));

        let snapshot = (detection.is_some() || self.observer.is_some())
            .then(|| Arc::new(self.waterfall.snapshot()));

        let mut dispatched = 0;
        if let (Some(detection), Some(snapshot)) = (&detection, &snapshot) {
            self.metrics.record_detection();
            self.logger.record_detection(detection);
            dispatched =
                self.dispatcher
                    .dispatch(detection.clone(), Arc::clone(snapshot), freq_axis);
        }
        if let (Some(observer), Some(snapshot)) = (&self.observer, snapshot) {
            observer.observe(snapshot, detection.as_ref());
        }

        Ok(CycleOutcome {
            sequence,
            detection,
            dispatched,
        })
    }

    /// Runs until interrupted, the cycle limit is hit, the source ends, or
    /// the device fails. Always finishes in `Stopped` with the device closed.
    pub fn run(&mut self) -> PipelineResult<RunSummary> {
        if self.state == PipelineState::Starting {
            self.start()?;
        }

        let outcome = loop {
            if self.shutdown.is_triggered() {
                info!("interrupt received, stopping acquisition");
                break Ok(StopReason::Interrupted);
            }
            if let Some(limit) = self.config.max_cycles {
                if self.next_sequence >= limit {
                    break Ok(StopReason::CycleLimit);
                }
            }

            match self.step() {
                Ok(_) => {}
                Err(PipelineError::Device(DeviceError::EndOfStream)) => {
                    info!("sample stream ended");
                    break Ok(StopReason::EndOfStream);
                }
                Err(err) if err.is_recoverable() => {
                    let failed = self.last_sequence().unwrap_or_default();
                    warn!("skipping cycle {}: {}", failed, err);
                    self.metrics.record_skipped();
                }
                Err(err) => {
                    error!("acquisition failed: {}", err);
                    break Err(err);
                }
            }
        };

        let drain = self.drain();
        let metrics = self.metrics.snapshot();
        match serde_json::to_string(&metrics) {
            Ok(json) => self.logger.record(&format!("final metrics {json}")),
            Err(err) => warn!("could not encode metrics: {}", err),
        }

        outcome.map(|stop_reason| RunSummary {
            stop_reason,
            metrics,
            drain,
        })
    }

    /// `Running -> Draining -> Stopped`: stops acquiring, gives sink tasks the
    /// grace period, then closes the device.
    fn drain(&mut self) -> DrainReport {
        if self.state != PipelineState::Running {
            return DrainReport::default();
        }
        self.transition(PipelineState::Draining);
        let report = self.dispatcher.drain(self.drain_grace);
        self.source.close();
        self.transition(PipelineState::Stopped);
        report
    }
}

impl<S: SampleSource> Drop for Pipeline<S> {
    fn drop(&mut self) {
        if self.state != PipelineState::Stopped {
            self.source.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{SampleBlock, SourceSettings};
    use crate::dispatch::{DetectionEvent, EventSink};
    use crate::prelude::{DispatchConfig, SinkResult};
    use num_complex::Complex32;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::runtime::{Builder, Runtime};

    struct ScriptedSource {
        settings: SourceSettings,
        blocks: VecDeque<Result<Vec<Complex32>, DeviceError>>,
        opened: bool,
        closed: Arc<Mutex<u32>>,
        fail_open: bool,
    }

    impl ScriptedSource {
        fn new(blocks: Vec<Result<Vec<Complex32>, DeviceError>>) -> Self {
            Self {
                settings: SourceSettings {
                    center_freq_hz: 100e6,
                    sample_rate_hz: 1e6,
                    block_size: 64,
                    ..Default::default()
                },
                blocks: blocks.into(),
                opened: false,
                closed: Arc::new(Mutex::new(0)),
                fail_open: false,
            }
        }
    }

    impl SampleSource for ScriptedSource {
        fn open(&mut self) -> Result<(), DeviceError> {
            if self.fail_open {
                return Err(DeviceError::Open("no device".into()));
            }
            self.opened = true;
            Ok(())
        }

        fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
            match self.blocks.pop_front() {
                Some(Ok(samples)) => Ok(SampleBlock::new(samples, &self.settings)),
                Some(Err(err)) => Err(err),
                None => Err(DeviceError::EndOfStream),
            }
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }

        fn settings(&self) -> &SourceSettings {
            &self.settings
        }
    }

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<DetectionEvent>>,
    }

    impl EventSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn handle(&self, event: &DetectionEvent) -> SinkResult<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn quiet() -> Vec<Complex32> {
        vec![Complex32::new(0.0, 0.0); 64]
    }

    fn loud() -> Vec<Complex32> {
        vec![Complex32::new(1.0, 0.0); 64]
    }

    fn runtime() -> Runtime {
        Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn pipeline(
        rt: &Runtime,
        source: ScriptedSource,
        sink: Arc<Collect>,
        config: PipelineConfig,
    ) -> Pipeline<ScriptedSource> {
        let metrics = Arc::new(MetricsRecorder::new());
        let dispatcher =
            DetectionDispatcher::new(rt.handle().clone(), DispatchConfig::default(), metrics.clone())
                .with_sink(sink);
        Pipeline::new(config, source, dispatcher, metrics, ShutdownSignal::new()).unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            resolution: 16,
            depth: 4,
            threshold_db: 0.0,
            max_cycles: None,
        }
    }

    #[test]
    fn runs_to_end_of_stream_and_dispatches_spikes() {
        let rt = runtime();
        let sink = Arc::new(Collect::default());
        let source = ScriptedSource::new(vec![Ok(quiet()), Ok(loud()), Ok(quiet())]);
        let closed = source.closed.clone();
        let mut pipeline = pipeline(&rt, source, sink.clone(), config());

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.metrics.cycles, 3);
        assert_eq!(summary.metrics.detections, 1);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(*closed.lock().unwrap(), 1);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.detection.source_row_index, 1);
        // DC lands in the centre of the shifted spectrum: raw bin 32, row bin 8.
        assert_eq!(event.detection.bin_index, 8);
        assert_eq!(event.waterfall.len(), 2);
        assert_eq!(event.freq_axis_mhz.len(), 16);
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let rt = runtime();
        let sink = Arc::new(Collect::default());
        let mut corrupt = quiet();
        corrupt[5] = Complex32::new(f32::INFINITY, 0.0);
        let source = ScriptedSource::new(vec![Ok(quiet()), Ok(corrupt), Ok(vec![]), Ok(quiet())]);
        let mut pipeline = pipeline(&rt, source, sink, config());

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.metrics.cycles, 2);
        assert_eq!(summary.metrics.skipped_cycles, 2);
        assert_eq!(pipeline.waterfall().depth(), 2);
    }

    #[test]
    fn skipped_cycle_keeps_its_sequence_number() {
        let rt = runtime();
        let sink = Arc::new(Collect::default());
        let source = ScriptedSource::new(vec![Ok(quiet()), Ok(vec![]), Ok(quiet())]);
        let mut pipeline = pipeline(&rt, source, sink, config());
        pipeline.start().unwrap();
        assert_eq!(pipeline.last_sequence(), None);

        assert_eq!(pipeline.step().unwrap().sequence, 0);
        let err = pipeline.step().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(pipeline.last_sequence(), Some(1));
        assert_eq!(pipeline.step().unwrap().sequence, 2);
        assert_eq!(pipeline.waterfall().latest().unwrap().sequence(), 2);
    }

    #[test]
    fn device_loss_is_fatal_but_still_drains() {
        let rt = runtime();
        let sink = Arc::new(Collect::default());
        let source = ScriptedSource::new(vec![
            Ok(loud()),
            Err(DeviceError::Disconnected("usb unplugged".into())),
            Ok(loud()),
        ]);
        let closed = source.closed.clone();
        let mut pipeline = pipeline(&rt, source, sink.clone(), config());

        let err = pipeline.run().unwrap_err();
        assert!(matches!(err, PipelineError::Device(DeviceError::Disconnected(_))));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(*closed.lock().unwrap(), 1);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn open_failure_stops_immediately() {
        let rt = runtime();
        let mut source = ScriptedSource::new(vec![Ok(quiet())]);
        source.fail_open = true;
        let mut pipeline = pipeline(&rt, source, Arc::new(Collect::default()), config());

        assert!(matches!(
            pipeline.run(),
            Err(PipelineError::Device(DeviceError::Open(_)))
        ));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn cycle_limit_and_interrupt_stop_the_loop() {
        let rt = runtime();
        let blocks = (0..20).map(|_| Ok(quiet())).collect();
        let mut limited = pipeline(
            &rt,
            ScriptedSource::new(blocks),
            Arc::new(Collect::default()),
            PipelineConfig {
                max_cycles: Some(5),
                ..config()
            },
        );
        let summary = limited.run().unwrap();
        assert_eq!(summary.stop_reason, StopReason::CycleLimit);
        assert_eq!(summary.metrics.cycles, 5);

        let blocks = (0..20).map(|_| Ok(quiet())).collect();
        let mut interrupted = pipeline(
            &rt,
            ScriptedSource::new(blocks),
            Arc::new(Collect::default()),
            config(),
        );
        interrupted.start().unwrap();
        interrupted.step().unwrap();
        interrupted.shutdown.trigger();
        let summary = interrupted.run().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert_eq!(summary.metrics.cycles, 1);
    }

    #[test]
    fn observer_sees_every_cycle() {
        #[derive(Default)]
        struct Frames(Mutex<Vec<(usize, bool)>>);

        impl FrameObserver for Frames {
            fn observe(&self, waterfall: Arc<WaterfallSnapshot>, detection: Option<&Detection>) {
                self.0
                    .lock()
                    .unwrap()
                    .push((waterfall.len(), detection.is_some()));
            }
        }

        let rt = runtime();
        let frames = Arc::new(Frames::default());
        let source = ScriptedSource::new((0..6).map(|_| Ok(quiet())).collect());
        let mut pipeline = pipeline(&rt, source, Arc::new(Collect::default()), config())
            .with_observer(frames.clone());
        pipeline.run().unwrap();

        let seen = frames.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(1, false), (2, false), (3, false), (4, false), (4, false), (4, false)]
        );
    }

    #[test]
    fn block_smaller_than_resolution_is_rejected() {
        let rt = runtime();
        let metrics = Arc::new(MetricsRecorder::new());
        let dispatcher =
            DetectionDispatcher::new(rt.handle().clone(), DispatchConfig::default(), metrics.clone());
        let result = Pipeline::new(
            PipelineConfig {
                resolution: 128,
                ..config()
            },
            ScriptedSource::new(vec![]),
            dispatcher,
            metrics,
            ShutdownSignal::new(),
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}
