use serde::Serialize;
use std::sync::Mutex;

/// Thread-safe counters shared by the acquisition loop and sink tasks.
#[derive(Debug)]
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub detections: u64,
    pub sink_deliveries: u64,
    pub sink_failures: u64,
    pub sink_timeouts: u64,
    pub dropped_dispatches: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_cycle(&self) {
        self.update(|m| m.cycles += 1);
    }

    pub fn record_skipped(&self) {
        self.update(|m| m.skipped_cycles += 1);
    }

    pub fn record_detection(&self) {
        self.update(|m| m.detections += 1);
    }

    pub fn record_delivery(&self) {
        self.update(|m| m.sink_deliveries += 1);
    }

    pub fn record_sink_failure(&self) {
        self.update(|m| m.sink_failures += 1);
    }

    pub fn record_sink_timeout(&self) {
        self.update(|m| m.sink_timeouts += 1);
    }

    pub fn record_dropped(&self) {
        self.update(|m| m.dropped_dispatches += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|metrics| *metrics)
            .unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counters_accumulate_across_threads() {
        let metrics = Arc::new(MetricsRecorder::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..25 {
                        metrics.record_delivery();
                    }
                    metrics.record_sink_failure();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        metrics.record_cycle();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sink_deliveries, 100);
        assert_eq!(snapshot.sink_failures, 4);
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.detections, 0);
    }
}
