use crate::dispatch::sink::{DetectionEvent, EventSink};
use crate::event::Detection;
use crate::prelude::{DispatchConfig, SinkError};
use crate::processing::WaterfallSnapshot;
use crate::telemetry::MetricsRecorder;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::{JoinError, JoinSet};

/// Outcome of waiting for in-flight sink work during shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub abandoned: usize,
}

/// Fans detections out to sinks as fire-and-forget tasks.
///
/// `dispatch` only spawns; it never waits for a sink. Concurrency is capped by
/// a semaphore and the number of queued invocations by `max_pending`.
/// Permits are granted in dispatch order, and a permit is held until the
/// sink call itself returns, even after its timeout has fired.
pub struct DetectionDispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
    runtime: Handle,
    permits: Arc<Semaphore>,
    last_grant: Option<oneshot::Receiver<()>>,
    tasks: JoinSet<()>,
    config: DispatchConfig,
    metrics: Arc<MetricsRecorder>,
}

impl DetectionDispatcher {
    pub fn new(runtime: Handle, config: DispatchConfig, metrics: Arc<MetricsRecorder>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            sinks: Vec::new(),
            runtime,
            permits,
            last_grant: None,
            tasks: JoinSet::new(),
            config,
            metrics,
        }
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.add_sink(Arc::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        debug!("registered sink {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|sink| sink.name().to_owned()).collect()
    }

    /// Hands `detection` to every sink. Returns the number of invocations
    /// spawned; the rest were dropped because the pending cap was reached.
    pub fn dispatch(
        &mut self,
        detection: Detection,
        waterfall: Arc<WaterfallSnapshot>,
        freq_axis_mhz: Arc<[f64]>,
    ) -> usize {
        self.reap();

        let event = Arc::new(DetectionEvent {
            detection,
            waterfall,
            freq_axis_mhz,
        });

        let mut spawned = 0;
        for sink in &self.sinks {
            if self.tasks.len() >= self.config.max_pending {
                warn!(
                    "dropping {} for row {}: {} sink tasks pending",
                    sink.name(),
                    event.detection.source_row_index,
                    self.tasks.len()
                );
                self.metrics.record_dropped();
                continue;
            }
            let (granted, grant) = oneshot::channel();
            let turn = Turn {
                previous: self.last_grant.replace(grant),
                granted,
            };
            let task = run_sink(
                Arc::clone(sink),
                Arc::clone(&event),
                Arc::clone(&self.permits),
                turn,
                self.config.sink_timeout,
                Arc::clone(&self.metrics),
            );
            self.tasks.spawn_on(task, &self.runtime);
            spawned += 1;
        }
        spawned
    }

    /// Waits up to `grace` for in-flight invocations, then aborts the rest.
    /// Must be called from outside the runtime.
    pub fn drain(&mut self, grace: Duration) -> DrainReport {
        let tasks = &mut self.tasks;
        let mut report = DrainReport::default();
        if tasks.is_empty() {
            return report;
        }
        debug!("draining {} sink tasks (grace {:?})", tasks.len(), grace);

        self.runtime.block_on(async {
            let waited = tokio::time::timeout(grace, async {
                while let Some(result) = tasks.join_next().await {
                    log_join(result);
                    report.completed += 1;
                }
            })
            .await;
            if waited.is_err() {
                report.abandoned = tasks.len();
                warn!("abandoning {} sink tasks after {:?}", report.abandoned, grace);
                tasks.shutdown().await;
            }
        });
        report
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join(result);
        }
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            warn!("sink task panicked: {}", err);
        }
    }
}

/// Place of one invocation in the permit queue: it asks for a permit only
/// after the previous invocation got one.
struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    granted: oneshot::Sender<()>,
}

async fn run_sink(
    sink: Arc<dyn EventSink>,
    event: Arc<DetectionEvent>,
    permits: Arc<Semaphore>,
    turn: Turn,
    timeout: Duration,
    metrics: Arc<MetricsRecorder>,
) {
    if let Some(previous) = turn.previous {
        // An aborted predecessor drops its sender, which also releases us.
        let _ = previous.await;
    }
    let Ok(permit) = permits.acquire_owned().await else {
        return;
    };
    let _ = turn.granted.send(());

    let name = sink.name().to_owned();
    let job = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        sink.handle(&event)
    });

    match tokio::time::timeout(timeout, job).await {
        Ok(Ok(Ok(()))) => {
            debug!("sink {} delivered", name);
            metrics.record_delivery();
        }
        Ok(Ok(Err(err))) => {
            warn!("sink {} failed: {}", name, err);
            metrics.record_sink_failure();
        }
        Ok(Err(err)) => {
            warn!("sink {} did not complete: {}", name, err);
            metrics.record_sink_failure();
        }
        Err(_) => {
            warn!("sink {} failed: {}", name, SinkError::Timeout(timeout));
            metrics.record_sink_timeout();
        }
    }
}
