use crate::backpressure::SaturationMonitor;
use crate::buffer::{BufferStats, PublishError, RingBuffer, Sequence};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, ProcessingError, Result, SubmitError};
use crate::metrics::{MetricsRecorder, NoopMetrics};
use crate::stage::{
    sample_occupancy, ErrorSink, LoggingErrorSink, Processor, Sink, SinkProcessor, Stage,
    StageRunner,
};
use crate::wait::WaitStrategyKind;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Name of the buffer producers submit into
pub const INGRESS_BUFFER: &str = "ingress";
/// Name of the buffer between the filter and output stages
pub const INTERMEDIATE_BUFFER: &str = "intermediate";
/// Stage name used for errors, metrics and worker thread names
pub const FILTER_STAGE: &str = "filter";
pub const OUTPUT_STAGE: &str = "output";

/// Lifecycle of a [`Pipeline`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Created = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Created,
            1 => PipelineState::Running,
            2 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Created => "created",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Settings plus the collaborators a pipeline calls into.
pub struct PipelineConfig<I, O> {
    pub settings: PipelineSettings,
    filter: Arc<dyn Processor<I, O>>,
    output: Arc<dyn Sink<O>>,
    error_sink: Arc<dyn ErrorSink>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<I, O> PipelineConfig<I, O>
where
    I: 'static,
    O: 'static,
{
    /// Failures are logged through [`LoggingErrorSink`] and metrics are
    /// discarded until replaced with the `with_*` methods.
    pub fn new<F, S>(settings: PipelineSettings, filter: F, output: S) -> Self
    where
        F: Fn(&I, Sequence) -> std::result::Result<Option<O>, ProcessingError> + Send + Sync + 'static,
        S: Fn(&O, Sequence) -> std::result::Result<(), ProcessingError> + Send + Sync + 'static,
    {
        Self::from_parts(settings, Arc::new(filter), Arc::new(output))
    }

    pub fn from_parts(
        settings: PipelineSettings,
        filter: Arc<dyn Processor<I, O>>,
        output: Arc<dyn Sink<O>>,
    ) -> Self {
        Self {
            settings,
            filter,
            output,
            error_sink: Arc::new(LoggingErrorSink),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = error_sink;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Builder for constructing pipelines
pub struct PipelineBuilder<I, O> {
    settings: PipelineSettings,
    filter: Option<Arc<dyn Processor<I, O>>>,
    output: Option<Arc<dyn Sink<O>>>,
    error_sink: Arc<dyn ErrorSink>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<I, O> PipelineBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            settings: PipelineSettings::default(),
            filter: None,
            output: None,
            error_sink: Arc::new(LoggingErrorSink),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replace every setting at once, e.g. with values loaded from a file
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn ingress_capacity(mut self, capacity: usize) -> Self {
        self.settings.ingress_capacity = capacity;
        self
    }

    pub fn intermediate_capacity(mut self, capacity: usize) -> Self {
        self.settings.intermediate_capacity = capacity;
        self
    }

    pub fn filter_pool_size(mut self, pool_size: usize) -> Self {
        self.settings.filter_pool_size = pool_size;
        self
    }

    pub fn output_pool_size(mut self, pool_size: usize) -> Self {
        self.settings.output_pool_size = pool_size;
        self
    }

    /// Use `kind` for both buffers
    pub fn wait_strategy(mut self, kind: WaitStrategyKind) -> Self {
        self.settings.ingress_wait_strategy = kind;
        self.settings.intermediate_wait_strategy = kind;
        self
    }

    pub fn ingress_wait_strategy(mut self, kind: WaitStrategyKind) -> Self {
        self.settings.ingress_wait_strategy = kind;
        self
    }

    pub fn intermediate_wait_strategy(mut self, kind: WaitStrategyKind) -> Self {
        self.settings.intermediate_wait_strategy = kind;
        self
    }

    pub fn stop_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.stop_timeout_ms = timeout.map_or(0, |timeout| timeout.as_millis().max(1) as u64);
        self
    }

    /// Filter stage body: `Ok(None)` drops the event, `Ok(Some(out))` forwards `out`
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&I, Sequence) -> std::result::Result<Option<O>, ProcessingError> + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn filter_processor<P>(mut self, processor: P) -> Self
    where
        P: Processor<I, O>,
    {
        self.filter = Some(Arc::new(processor));
        self
    }

    /// Terminal sink invoked by the output stage for every forwarded event
    pub fn output<S>(mut self, output: S) -> Self
    where
        S: Fn(&O, Sequence) -> std::result::Result<(), ProcessingError> + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(output));
        self
    }

    pub fn sink<S>(mut self, sink: S) -> Self
    where
        S: Sink<O>,
    {
        self.output = Some(Arc::new(sink));
        self
    }

    pub fn error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = error_sink;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate the settings and build a pipeline in the `Created` state
    pub fn build(self) -> Result<Pipeline<I, O>> {
        self.settings.validate()?;
        let filter = self
            .filter
            .ok_or_else(|| PipelineError::InvalidConfig("no filter stage configured".into()))?;
        let output = self
            .output
            .ok_or_else(|| PipelineError::InvalidConfig("no output sink configured".into()))?;

        let config = PipelineConfig::from_parts(self.settings, filter, output)
            .with_error_sink(self.error_sink)
            .with_metrics(self.metrics);
        Ok(Pipeline::new(config))
    }
}

impl<I, O> Default for PipelineBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct Stages<I, O> {
    filter: Option<Stage<I>>,
    output: Option<Stage<O>>,
}

impl<I, O> Stages<I, O> {
    fn pending(&self) -> usize {
        self.filter.as_ref().map_or(0, Stage::running) + self.output.as_ref().map_or(0, Stage::running)
    }

    fn abort(&self) {
        if let Some(filter) = &self.filter {
            filter.abort();
        }
        if let Some(output) = &self.output {
            output.abort();
        }
    }
}

/// Two-stage event pipeline:
/// producers → ingress buffer → filter pool → intermediate buffer → output pool → sink.
///
/// `submit` blocks while the ingress buffer is full, and a full intermediate
/// buffer blocks the filter workers in turn, so a slow sink throttles
/// producers instead of losing events. `stop` stops admitting events and
/// returns once every admitted event has gone through both stages.
pub struct Pipeline<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    config: PipelineConfig<I, O>,
    state: AtomicU8,
    ingress: OnceLock<Arc<RingBuffer<I>>>,
    intermediate: OnceLock<Arc<RingBuffer<O>>>,
    stages: Mutex<Stages<I, O>>,
    throttle: SaturationMonitor,
}

impl<I, O> Pipeline<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Create a pipeline in the `Created` state. Settings are checked by `start`.
    pub fn new(config: PipelineConfig<I, O>) -> Self {
        let throttle = SaturationMonitor::with_watermarks(
            config.settings.throttle_high_watermark,
            config.settings.throttle_low_watermark,
        );
        Self {
            config,
            state: AtomicU8::new(PipelineState::Created as u8),
            ingress: OnceLock::new(),
            intermediate: OnceLock::new(),
            stages: Mutex::new(Stages {
                filter: None,
                output: None,
            }),
            throttle,
        }
    }

    pub fn builder() -> PipelineBuilder<I, O> {
        PipelineBuilder::new()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.config.settings
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Allocate both buffers and spawn every worker.
    ///
    /// Returns once all workers are running; only then does `submit` accept
    /// events. Fails with `AlreadyStarted` unless the pipeline is `Created`.
    pub fn start(&self) -> Result<()> {
        let mut stages = self.stages.lock();
        if self.state() != PipelineState::Created {
            return Err(PipelineError::AlreadyStarted);
        }

        let settings = &self.config.settings;
        settings.validate()?;

        let ingress = Arc::new(RingBuffer::with_wait_strategy(
            INGRESS_BUFFER,
            settings.ingress_capacity,
            settings.ingress_wait_strategy,
            settings.max_park(),
        )?);
        let intermediate = Arc::new(RingBuffer::with_wait_strategy(
            INTERMEDIATE_BUFFER,
            settings.intermediate_capacity,
            settings.intermediate_wait_strategy,
            settings.max_park(),
        )?);

        // Downstream first, so the filter never publishes into an ungated buffer
        let sink: Arc<dyn Processor<O, ()>> =
            Arc::new(SinkProcessor::new(Arc::clone(&self.config.output)));
        let output_runner = StageRunner::new(
            OUTPUT_STAGE,
            sink,
            None,
            Arc::clone(&self.config.error_sink),
            Arc::clone(&self.config.metrics),
        );
        let mut output = Stage::spawn(output_runner, Arc::clone(&intermediate), settings.output_pool_size)?;

        let filter_runner = StageRunner::new(
            FILTER_STAGE,
            Arc::clone(&self.config.filter),
            Some(Arc::clone(&intermediate)),
            Arc::clone(&self.config.error_sink),
            Arc::clone(&self.config.metrics),
        );
        let filter = match Stage::spawn(filter_runner, Arc::clone(&ingress), settings.filter_pool_size) {
            Ok(filter) => filter,
            Err(err) => {
                intermediate.shutdown();
                let _ = output.drain(None);
                return Err(err);
            }
        };

        let _ = self.ingress.set(ingress);
        let _ = self.intermediate.set(intermediate);
        stages.filter = Some(filter);
        stages.output = Some(output);
        self.set_state(PipelineState::Running);

        info!(
            ingress_capacity = settings.ingress_capacity,
            intermediate_capacity = settings.intermediate_capacity,
            filter_pool_size = settings.filter_pool_size,
            output_pool_size = settings.output_pool_size,
            ingress_wait_strategy = ?settings.ingress_wait_strategy,
            intermediate_wait_strategy = ?settings.intermediate_wait_strategy,
            "pipeline started"
        );
        Ok(())
    }

    /// Submit an event, blocking while the ingress buffer is full
    pub fn submit(&self, event: I) -> std::result::Result<Sequence, SubmitError<I>> {
        let ingress = match self.admission() {
            Admission::Open(ingress) => ingress,
            Admission::NotStarted => return Err(SubmitError::NotRunning(event)),
            Admission::Closed => return Err(SubmitError::Stopped(event)),
        };
        let published = ingress.publish(event);
        self.record_submit(ingress, published)
    }

    /// Submit without blocking; a full ingress buffer yields `SubmitError::Full`
    pub fn try_submit(&self, event: I) -> std::result::Result<Sequence, SubmitError<I>> {
        let ingress = match self.admission() {
            Admission::Open(ingress) => ingress,
            Admission::NotStarted => return Err(SubmitError::NotRunning(event)),
            Admission::Closed => return Err(SubmitError::Stopped(event)),
        };
        let published = ingress.try_publish(event);
        self.record_submit(ingress, published)
    }

    fn admission(&self) -> Admission<'_, I> {
        match self.state() {
            PipelineState::Created => Admission::NotStarted,
            PipelineState::Draining | PipelineState::Stopped => Admission::Closed,
            PipelineState::Running => match self.ingress.get() {
                Some(ingress) => Admission::Open(ingress),
                None => Admission::NotStarted,
            },
        }
    }

    fn record_submit(
        &self,
        ingress: &RingBuffer<I>,
        published: std::result::Result<Sequence, PublishError<I>>,
    ) -> std::result::Result<Sequence, SubmitError<I>> {
        match published {
            Ok(sequence) => {
                self.config.metrics.events_published(INGRESS_BUFFER, 1);
                sample_occupancy(self.config.metrics.as_ref(), ingress, sequence);
                Ok(sequence)
            }
            Err(PublishError::Full(event)) => Err(SubmitError::Full(event)),
            Err(PublishError::Closed(event)) => Err(SubmitError::Stopped(event)),
        }
    }

    /// Stop admitting events and wait for both stages to drain.
    ///
    /// With a timeout, returns `DrainTimeout` if workers are still busy when
    /// it expires. Workers are then asked to exit after their current event
    /// and the pipeline stays `Draining`; calling `stop` again joins them.
    /// Threads are never killed, so a processor that never returns keeps its
    /// worker alive. Calling `stop` on a stopped pipeline is a no-op.
    pub fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        let mut stages = self.stages.lock();
        match self.state() {
            PipelineState::Stopped => return Ok(()),
            PipelineState::Created => {
                self.set_state(PipelineState::Stopped);
                info!("pipeline stopped before it was started");
                return Ok(());
            }
            PipelineState::Running => {
                self.set_state(PipelineState::Draining);
                info!("pipeline draining");
            }
            PipelineState::Draining => {}
        }

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        if let Some(ingress) = self.ingress.get() {
            ingress.shutdown();
        }

        match self.drain(&mut stages, deadline) {
            Err(PipelineError::DrainTimeout { .. }) => {
                let pending = stages.pending();
                stages.abort();
                if let Some(ingress) = self.ingress.get() {
                    ingress.halt();
                }
                if let Some(intermediate) = self.intermediate.get() {
                    intermediate.halt();
                }
                warn!(pending, "pipeline drain timed out; workers asked to abort");
                Err(PipelineError::DrainTimeout { pending })
            }
            outcome => {
                stages.filter = None;
                stages.output = None;
                self.throttle.reset();
                self.set_state(PipelineState::Stopped);
                info!("pipeline stopped");
                outcome
            }
        }
    }

    /// Filter stage first, then the output stage once nothing more can reach it
    fn drain(&self, stages: &mut Stages<I, O>, deadline: Option<Instant>) -> Result<()> {
        let mut outcome = Ok(());
        if let Some(filter) = stages.filter.as_mut() {
            match filter.drain(deadline) {
                Err(err @ PipelineError::DrainTimeout { .. }) => return Err(err),
                Err(err) => outcome = Err(err),
                Ok(()) => {}
            }
        }
        if let Some(intermediate) = self.intermediate.get() {
            intermediate.shutdown();
        }
        if let Some(output) = stages.output.as_mut() {
            output.drain(deadline)?;
        }
        outcome
    }

    /// Whether the ingress buffer is above the throttle watermark.
    ///
    /// Advisory: producers may back off while this is true, but `submit`
    /// keeps working and only blocks once the buffer is actually full.
    pub fn is_throttled(&self) -> bool {
        match self.ingress.get() {
            Some(ingress) if self.state() == PipelineState::Running => {
                self.throttle.check_and_update(ingress.utilization())
            }
            _ => false,
        }
    }

    /// Ingress and intermediate buffer statistics; empty before `start`
    pub fn buffer_stats(&self) -> Vec<BufferStats> {
        let mut stats = Vec::with_capacity(2);
        if let Some(ingress) = self.ingress.get() {
            stats.push(ingress.stats());
        }
        if let Some(intermediate) = self.intermediate.get() {
            stats.push(intermediate.stats());
        }
        stats
    }
}

impl<I, O> Drop for Pipeline<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if matches!(self.state(), PipelineState::Running | PipelineState::Draining) {
            if let Err(err) = self.stop(self.config.settings.stop_timeout()) {
                warn!(%err, "pipeline dropped before it finished draining");
            }
        }
    }
}

enum Admission<'a, I> {
    Open(&'a RingBuffer<I>),
    NotStarted,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetrics;
    use std::sync::atomic::AtomicU64;

    fn counting_pipeline(counter: Arc<AtomicU64>) -> Pipeline<u64, u64> {
        PipelineBuilder::new()
            .ingress_capacity(8)
            .intermediate_capacity(8)
            .filter(|value: &u64, _| Ok(Some(*value)))
            .output(move |_: &u64, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = PipelineBuilder::<u64, u64>::new().build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));

        let result = PipelineBuilder::<u64, u64>::new()
            .filter(|value: &u64, _| Ok(Some(*value)))
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_validates_settings() {
        let result = PipelineBuilder::<u64, u64>::new()
            .ingress_capacity(10)
            .filter(|value: &u64, _| Ok(Some(*value)))
            .output(|_: &u64, _| Ok(()))
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_new_with_invalid_settings_fails_on_start() {
        let settings = PipelineSettings {
            filter_pool_size: 0,
            ..PipelineSettings::default()
        };
        let config = PipelineConfig::new(settings, |value: &u8, _| Ok(Some(*value)), |_: &u8, _| Ok(()));
        let pipeline = Pipeline::new(config);

        assert!(matches!(pipeline.start(), Err(PipelineError::InvalidConfig(_))));
        assert_eq!(pipeline.state(), PipelineState::Created);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let counter = Arc::new(AtomicU64::new(0));
        let pipeline = counting_pipeline(Arc::clone(&counter));
        assert_eq!(pipeline.state(), PipelineState::Created);
        assert!(pipeline.buffer_stats().is_empty());

        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStarted)));

        for value in 0..20 {
            pipeline.submit(value).unwrap();
        }
        pipeline.stop(None).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(counter.load(Ordering::SeqCst), 20);

        let stats = pipeline.buffer_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, INGRESS_BUFFER);
        assert_eq!(stats[0].cursor, 20);
        assert_eq!(stats[1].name, INTERMEDIATE_BUFFER);
    }

    #[test]
    fn test_stop_before_start() {
        let pipeline = counting_pipeline(Arc::new(AtomicU64::new(0)));
        pipeline.stop(None).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStarted)));
        assert!(matches!(pipeline.submit(1), Err(SubmitError::Stopped(1))));
    }

    #[test]
    fn test_submit_rejected_outside_running() {
        let pipeline = counting_pipeline(Arc::new(AtomicU64::new(0)));
        assert!(matches!(pipeline.submit(7), Err(SubmitError::NotRunning(7))));
        assert!(matches!(pipeline.try_submit(8), Err(SubmitError::NotRunning(8))));

        pipeline.start().unwrap();
        pipeline.stop(Some(Duration::from_secs(5))).unwrap();
        let err = pipeline.submit(9).unwrap_err();
        assert!(err.is_stopped());
        assert_eq!(err.into_inner(), 9);
    }

    #[test]
    fn test_drop_drains_running_pipeline() {
        let counter = Arc::new(AtomicU64::new(0));
        {
            let pipeline = counting_pipeline(Arc::clone(&counter));
            pipeline.start().unwrap();
            for value in 0..5 {
                pipeline.submit(value).unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_metrics_reported_per_stage() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let pipeline = PipelineBuilder::new()
            .ingress_capacity(16)
            .intermediate_capacity(16)
            .filter(|value: &u32, _| Ok((*value % 2 == 0).then_some(*value)))
            .output(|_: &u32, _| Ok(()))
            .metrics(metrics.clone())
            .build()
            .unwrap();

        pipeline.start().unwrap();
        for value in 0..10u32 {
            pipeline.submit(value).unwrap();
        }
        pipeline.stop(None).unwrap();

        assert_eq!(metrics.published(INGRESS_BUFFER), 10);
        assert_eq!(metrics.published(INTERMEDIATE_BUFFER), 5);
        assert_eq!(metrics.occupancy(INGRESS_BUFFER).map(|gauge| gauge.capacity), Some(16));

        let filter = metrics.snapshot(FILTER_STAGE).unwrap();
        assert_eq!(filter.total_processed, 10);
        assert_eq!(filter.total_filtered, 5);
        let output = metrics.snapshot(OUTPUT_STAGE).unwrap();
        assert_eq!(output.total_processed, 5);
    }

    #[test]
    fn test_full_ingress_reported_to_metrics() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let gate = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let pipeline = {
            let gate = Arc::clone(&gate);
            PipelineBuilder::new()
                .ingress_capacity(4)
                .filter(move |value: &u32, _| {
                    while !gate.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Ok(Some(*value))
                })
                .output(|_: &u32, _| Ok(()))
                .metrics(metrics.clone())
                .build()
                .unwrap()
        };

        pipeline.start().unwrap();
        for value in 0..4u32 {
            pipeline.try_submit(value).unwrap();
        }
        assert!(matches!(pipeline.try_submit(4), Err(SubmitError::Full(4))));
        assert_eq!(
            metrics.occupancy(INGRESS_BUFFER).map(|gauge| (gauge.used, gauge.capacity)),
            Some((4, 4))
        );

        gate.store(true, Ordering::SeqCst);
        pipeline.stop(None).unwrap();
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Draining.to_string(), "draining");
        assert_eq!(PipelineState::from_u8(PipelineState::Running as u8), PipelineState::Running);
    }
}
