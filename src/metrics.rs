use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counter/gauge collaborator the pipeline reports to.
///
/// Every method has a no-op default so implementations only override what
/// they export. Calls happen on worker and producer threads, so
/// implementations must be cheap and must not block.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// `count` events were published into `buffer`
    fn events_published(&self, _buffer: &str, _count: u64) {}

    /// Worker `worker` of `stage` finished processing one event
    fn event_processed(&self, _stage: &str, _worker: usize, _latency: Duration) {}

    /// The stage's processor dropped the event
    fn event_filtered(&self, _stage: &str, _worker: usize) {}

    /// Processing the event failed and was reported to the error sink
    fn event_failed(&self, _stage: &str, _worker: usize) {}

    /// Sampled occupancy of `buffer` (slots not yet released by all groups)
    fn buffer_occupancy(&self, _buffer: &str, _used: u64, _capacity: u64) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {}

/// A simple percentile tracker that maintains a sliding window of measurements
#[derive(Debug, Clone)]
pub struct PercentileTracker {
    measurements: Arc<Mutex<VecDeque<u64>>>,
    window_size: usize,
}

impl PercentileTracker {
    /// Create a new percentile tracker with a specified window size
    pub fn new(window_size: usize) -> Self {
        Self {
            measurements: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size,
        }
    }

    /// Record a measurement (in nanoseconds)
    pub fn record(&self, nanos: u64) {
        let mut measurements = self.measurements.lock();
        if measurements.len() >= self.window_size {
            measurements.pop_front();
        }
        measurements.push_back(nanos);
    }

    /// Calculate the p50 (median) latency in microseconds
    pub fn p50_us(&self) -> f64 {
        self.percentile(0.50)
    }

    /// Calculate the p95 (95th percentile) latency in microseconds
    pub fn p95_us(&self) -> f64 {
        self.percentile(0.95)
    }

    /// Calculate the p99 (99th percentile) latency in microseconds
    pub fn p99_us(&self) -> f64 {
        self.percentile(0.99)
    }

    fn percentile(&self, p: f64) -> f64 {
        let measurements = self.measurements.lock();
        if measurements.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<_> = measurements.iter().copied().collect();
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
        sorted[idx] as f64 / 1000.0
    }

    /// Get the count of recorded measurements
    pub fn count(&self) -> usize {
        self.measurements.lock().len()
    }
}

/// Counters and latency window for one stage
#[derive(Debug, Clone)]
pub struct StageMetrics {
    processed: Arc<AtomicU64>,
    filtered: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    per_worker: Arc<Mutex<Vec<u64>>>,
    latency_tracker: PercentileTracker,
    start_time: Instant,
}

impl StageMetrics {
    /// Create a new metrics collector for a stage
    pub fn new() -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            filtered: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            per_worker: Arc::new(Mutex::new(Vec::new())),
            latency_tracker: PercentileTracker::new(1000),
            start_time: Instant::now(),
        }
    }

    /// Record a processed event and its latency on worker `worker`
    pub fn record_processed(&self, worker: usize, latency: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.latency_tracker.record(latency.as_nanos() as u64);

        let mut per_worker = self.per_worker.lock();
        if per_worker.len() <= worker {
            per_worker.resize(worker + 1, 0);
        }
        per_worker[worker] += 1;
    }

    /// Record an event dropped by the processor
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event whose processing failed
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of events processed
    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Get the total number of events filtered out
    pub fn total_filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Get the total number of failed events
    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Events processed by each worker, indexed by ordinal
    pub fn per_worker(&self) -> Vec<u64> {
        self.per_worker.lock().clone()
    }

    /// Calculate current throughput in events per second
    pub fn throughput_eps(&self) -> f64 {
        let elapsed = self.start_time.elapsed();
        let total = self.total_processed();
        if elapsed.as_secs_f64() == 0.0 {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_processed: self.total_processed(),
            total_filtered: self.total_filtered(),
            total_failed: self.total_failed(),
            per_worker: self.per_worker(),
            throughput_eps: self.throughput_eps(),
            latency_p50_us: self.latency_tracker.p50_us(),
            latency_p95_us: self.latency_tracker.p95_us(),
            latency_p99_us: self.latency_tracker.p99_us(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of one stage's metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub total_filtered: u64,
    pub total_failed: u64,
    pub per_worker: Vec<u64>,
    pub throughput_eps: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Processed: {}, Filtered: {}, Failed: {}, Per worker: {:?}, Throughput: {:.2} ev/s, \
             Latency P50: {:.2}µs, P95: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.total_processed,
            self.total_filtered,
            self.total_failed,
            self.per_worker,
            self.throughput_eps,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Last sampled occupancy of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferGauge {
    pub used: u64,
    pub capacity: u64,
}

/// In-process recorder keeping per-stage [`StageMetrics`] and buffer gauges
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    stages: RwLock<HashMap<String, StageMetrics>>,
    published: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, BufferGauge>>,
}

impl InMemoryMetrics {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics handle for `stage`, created on first use
    pub fn stage(&self, stage: &str) -> StageMetrics {
        if let Some(metrics) = self.stages.read().get(stage) {
            return metrics.clone();
        }
        self.stages
            .write()
            .entry(stage.to_string())
            .or_default()
            .clone()
    }

    /// Snapshot of `stage`, if it has reported anything
    pub fn snapshot(&self, stage: &str) -> Option<MetricsSnapshot> {
        self.stages.read().get(stage).map(StageMetrics::snapshot)
    }

    /// Get the total number of events published into `buffer`
    pub fn published(&self, buffer: &str) -> u64 {
        self.published
            .read()
            .get(buffer)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Last sampled occupancy of `buffer`
    pub fn occupancy(&self, buffer: &str) -> Option<BufferGauge> {
        self.gauges.read().get(buffer).copied()
    }

    /// Get a summary of all stage metrics, ordered by stage name
    pub fn summary(&self) -> String {
        let stages: BTreeMap<_, _> = self
            .stages
            .read()
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
            .collect();

        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for (name, snapshot) in stages {
            summary.push_str(&format!("  Stage {}: {}\n", name, snapshot.format()));
        }
        summary
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn events_published(&self, buffer: &str, count: u64) {
        if let Some(counter) = self.published.read().get(buffer) {
            counter.fetch_add(count, Ordering::Relaxed);
            return;
        }
        self.published
            .write()
            .entry(buffer.to_string())
            .or_default()
            .fetch_add(count, Ordering::Relaxed);
    }

    fn event_processed(&self, stage: &str, worker: usize, latency: Duration) {
        self.stage(stage).record_processed(worker, latency);
    }

    fn event_filtered(&self, stage: &str, _worker: usize) {
        self.stage(stage).record_filtered();
    }

    fn event_failed(&self, stage: &str, _worker: usize) {
        self.stage(stage).record_failed();
    }

    fn buffer_occupancy(&self, buffer: &str, used: u64, capacity: u64) {
        self.gauges
            .write()
            .insert(buffer.to_string(), BufferGauge { used, capacity });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_tracker() {
        let tracker = PercentileTracker::new(10);
        for i in 1..=10 {
            tracker.record(i * 1000);
        }
        assert_eq!(tracker.count(), 10);
        assert!(tracker.p50_us() > 0.0);
        assert!(tracker.p99_us() >= tracker.p50_us());
    }

    #[test]
    fn test_percentile_window_slides() {
        let tracker = PercentileTracker::new(2);
        tracker.record(1_000);
        tracker.record(2_000);
        tracker.record(3_000);
        assert_eq!(tracker.count(), 2);
        assert_eq!(tracker.p50_us(), 2.0);
    }

    #[test]
    fn test_stage_metrics_per_worker() {
        let metrics = StageMetrics::new();
        metrics.record_processed(1, Duration::from_micros(5));
        metrics.record_processed(1, Duration::from_micros(5));
        metrics.record_processed(0, Duration::from_micros(5));
        metrics.record_filtered();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_processed, 3);
        assert_eq!(snapshot.total_filtered, 1);
        assert_eq!(snapshot.per_worker, vec![1, 2]);
        assert!(snapshot.throughput_eps > 0.0);
    }

    #[test]
    fn test_in_memory_recorder() {
        let metrics = InMemoryMetrics::new();
        metrics.events_published("ingress", 3);
        metrics.events_published("ingress", 2);
        metrics.event_processed("filter", 0, Duration::from_micros(1));
        metrics.event_failed("filter", 0);
        metrics.buffer_occupancy("ingress", 4, 16);

        assert_eq!(metrics.published("ingress"), 5);
        assert_eq!(metrics.published("intermediate"), 0);
        assert_eq!(
            metrics.occupancy("ingress"),
            Some(BufferGauge { used: 4, capacity: 16 })
        );

        let snapshot = metrics.snapshot("filter").unwrap();
        assert_eq!(snapshot.total_processed, 1);
        assert_eq!(snapshot.total_failed, 1);
        assert!(metrics.snapshot("output").is_none());
        assert!(metrics.summary().contains("Stage filter"));
    }
}
