use crate::buffer::{RingBuffer, Sequence};
use crate::error::{ProcessingError, Result};
use crate::group::{panic_message, ConsumerGroup};
use crate::metrics::MetricsRecorder;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Buffer occupancy is reported to the metrics collaborator once every this
/// many sequences (or every `capacity` sequences on smaller buffers), and
/// whenever a publish leaves the buffer full.
pub const OCCUPANCY_SAMPLE_INTERVAL: u64 = 64;

/// Report `buffer`'s occupancy after `sequence` was published, if a sample
/// is due
pub(crate) fn sample_occupancy<E>(metrics: &dyn MetricsRecorder, buffer: &RingBuffer<E>, sequence: Sequence) {
    let capacity = buffer.capacity() as u64;
    let interval = OCCUPANCY_SAMPLE_INTERVAL.min(capacity);
    if sequence % interval == 0 || buffer.is_full_after(sequence) {
        metrics.buffer_occupancy(buffer.name(), buffer.occupancy(), capacity);
    }
}

/// Transformation applied by a stage to every event it claims.
///
/// Returning `Ok(None)` drops the event (filtered out); `Ok(Some(out))` hands
/// `out` to the next buffer.
pub trait Processor<I, O>: Send + Sync + 'static {
    fn process(&self, event: &I, sequence: Sequence) -> std::result::Result<Option<O>, ProcessingError>;
}

impl<I, O, F> Processor<I, O> for F
where
    F: Fn(&I, Sequence) -> std::result::Result<Option<O>, ProcessingError> + Send + Sync + 'static,
{
    fn process(&self, event: &I, sequence: Sequence) -> std::result::Result<Option<O>, ProcessingError> {
        self(event, sequence)
    }
}

/// Terminal consumer of fully processed events
pub trait Sink<O>: Send + Sync + 'static {
    fn emit(&self, event: &O, sequence: Sequence) -> std::result::Result<(), ProcessingError>;
}

impl<O, F> Sink<O> for F
where
    F: Fn(&O, Sequence) -> std::result::Result<(), ProcessingError> + Send + Sync + 'static,
{
    fn emit(&self, event: &O, sequence: Sequence) -> std::result::Result<(), ProcessingError> {
        self(event, sequence)
    }
}

/// Receives per-event failures from every stage
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, stage: &str, sequence: Sequence, error: &ProcessingError);
}

impl<F> ErrorSink for F
where
    F: Fn(&str, Sequence, &ProcessingError) + Send + Sync + 'static,
{
    fn report(&self, stage: &str, sequence: Sequence, error: &ProcessingError) {
        self(stage, sequence, error)
    }
}

/// Default error sink: logs every failure at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn report(&self, stage: &str, sequence: Sequence, error: &ProcessingError) {
        error!(stage, sequence, %error, "failed to process event");
    }
}

/// Forwards every event unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl<I> Processor<I, I> for Passthrough
where
    I: Clone + Send + Sync + 'static,
{
    fn process(&self, event: &I, _sequence: Sequence) -> std::result::Result<Option<I>, ProcessingError> {
        Ok(Some(event.clone()))
    }
}

/// Forwards events matching a predicate, drops the rest
pub struct FilterProcessor<F> {
    predicate: F,
}

impl<F> FilterProcessor<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<I, F> Processor<I, I> for FilterProcessor<F>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&I) -> bool + Send + Sync + 'static,
{
    fn process(&self, event: &I, _sequence: Sequence) -> std::result::Result<Option<I>, ProcessingError> {
        if (self.predicate)(event) {
            Ok(Some(event.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Transforms every event; a mapping error is a processing error for that event
pub struct MapProcessor<F, I> {
    mapper: F,
    _input: PhantomData<fn(&I)>,
}

impl<F, I> MapProcessor<F, I> {
    pub fn new(mapper: F) -> Self {
        Self {
            mapper,
            _input: PhantomData,
        }
    }
}

impl<I, O, F> Processor<I, O> for MapProcessor<F, I>
where
    I: 'static,
    F: Fn(&I) -> std::result::Result<O, ProcessingError> + Send + Sync + 'static,
{
    fn process(&self, event: &I, _sequence: Sequence) -> std::result::Result<Option<O>, ProcessingError> {
        (self.mapper)(event).map(Some)
    }
}

/// Adapts a sink to the processor interface used by the terminal stage
pub(crate) struct SinkProcessor<O> {
    sink: Arc<dyn Sink<O>>,
}

impl<O> SinkProcessor<O> {
    pub(crate) fn new(sink: Arc<dyn Sink<O>>) -> Self {
        Self { sink }
    }
}

impl<O: 'static> Processor<O, ()> for SinkProcessor<O> {
    fn process(&self, event: &O, sequence: Sequence) -> std::result::Result<Option<()>, ProcessingError> {
        self.sink.emit(event, sequence).map(Some)
    }
}

/// Per-event body of a stage: process, time, forward downstream, and isolate
/// failures so that one bad event never stops a worker.
pub struct StageRunner<I, O> {
    name: Arc<str>,
    processor: Arc<dyn Processor<I, O>>,
    downstream: Option<Arc<RingBuffer<O>>>,
    error_sink: Arc<dyn ErrorSink>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<I, O> StageRunner<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<Arc<str>>,
        processor: Arc<dyn Processor<I, O>>,
        downstream: Option<Arc<RingBuffer<O>>>,
        error_sink: Arc<dyn ErrorSink>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            name: name.into(),
            processor,
            downstream,
            error_sink,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one claimed event on worker `ordinal`
    pub fn handle(&self, ordinal: usize, sequence: Sequence, event: &I) {
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.processor.process(event, sequence)))
            .unwrap_or_else(|payload| Err(ProcessingError::Panicked(panic_message(payload.as_ref()))));
        let latency = start.elapsed();

        match outcome {
            Ok(Some(output)) => {
                self.metrics.event_processed(&self.name, ordinal, latency);
                if let Some(downstream) = &self.downstream {
                    self.forward(downstream, ordinal, sequence, output);
                }
            }
            Ok(None) => {
                self.metrics.event_processed(&self.name, ordinal, latency);
                self.metrics.event_filtered(&self.name, ordinal);
            }
            Err(error) => self.fail(ordinal, sequence, &error),
        }
    }

    fn forward(&self, downstream: &RingBuffer<O>, ordinal: usize, sequence: Sequence, output: O) {
        match downstream.publish(output) {
            Ok(published) => {
                self.metrics.events_published(downstream.name(), 1);
                sample_occupancy(self.metrics.as_ref(), downstream, published);
            }
            Err(_) => self.fail(ordinal, sequence, &ProcessingError::DownstreamClosed),
        }
    }

    fn fail(&self, ordinal: usize, sequence: Sequence, error: &ProcessingError) {
        self.metrics.event_failed(&self.name, ordinal);
        let reported = panic::catch_unwind(AssertUnwindSafe(|| {
            self.error_sink.report(&self.name, sequence, error)
        }));
        if let Err(payload) = reported {
            error!(
                stage = %self.name,
                sequence,
                %error,
                panic = %panic_message(payload.as_ref()),
                "error sink panicked while reporting a failed event"
            );
        }
    }
}

/// A named processing step: one consumer group on a source buffer, running a
/// [`StageRunner`] for every claimed event.
pub struct Stage<I> {
    name: String,
    group: ConsumerGroup<I>,
}

impl<I> Stage<I>
where
    I: Send + Sync + 'static,
{
    /// Spawn `pool_size` workers reading `source`
    pub fn spawn<O>(runner: StageRunner<I, O>, source: Arc<RingBuffer<I>>, pool_size: usize) -> Result<Self>
    where
        O: Send + Sync + 'static,
    {
        let name = runner.name().to_string();
        let runner = Arc::new(runner);
        let handler = Arc::new(move |ordinal: usize, sequence: Sequence, event: &I| {
            runner.handle(ordinal, sequence, event)
        });
        let group = ConsumerGroup::spawn(name.clone(), source, pool_size, handler)?;
        Ok(Self { name, group })
    }
}

impl<I> Stage<I> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_size(&self) -> usize {
        self.group.pool_size()
    }

    /// Workers still inside their loop
    pub fn running(&self) -> usize {
        self.group.running()
    }

    /// Wait until every worker drained the source buffer and exited
    pub fn drain(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.group.await_exit(deadline)
    }

    /// Ask workers to exit after their current event
    pub fn abort(&self) {
        self.group.abort();
    }
}
