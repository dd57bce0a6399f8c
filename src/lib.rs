//! A ring-buffer based, multi-stage event pipeline for log ingestion.
//!
//! Producers publish events into a fixed-capacity ring buffer. A pool of
//! filter workers consumes them, partitioned by `sequence % pool_size`, and
//! forwards what survives into a second ring buffer read by a pool of output
//! workers that hand every event to a terminal sink.
//!
//! # Features
//!
//! - Pre-allocated ring buffers with a monotonic sequence cursor
//! - Lock-free partitioning of every buffer across a fixed worker pool
//! - Blocking backpressure: a full buffer parks producers, nothing is dropped
//! - Graceful drain on `stop`, with an optional deadline
//! - Per-event error and panic isolation through an error sink
//! - Pluggable metrics collaborator (`MetricsRecorder`), in-memory recorder included
//! - Settings loadable from TOML via the `config` crate
//!
//! # Example
//!
//! ```no_run
//! use ring_pipeline::PipelineBuilder;
//!
//! let pipeline = PipelineBuilder::new()
//!     .ingress_capacity(1024)
//!     .filter_pool_size(2)
//!     .filter(|line: &String, _| Ok((!line.is_empty()).then(|| line.to_uppercase())))
//!     .output(|line: &String, sequence| {
//!         println!("{sequence}: {line}");
//!         Ok(())
//!     })
//!     .build()?;
//!
//! pipeline.start()?;
//! pipeline.submit("hello".to_string()).ok();
//! pipeline.stop(None)?;
//! # Ok::<(), ring_pipeline::PipelineError>(())
//! ```

pub mod backpressure;
pub mod buffer;
pub mod config;
pub mod error;
pub mod group;
pub mod metrics;
pub mod pipeline;
pub mod stage;
pub mod wait;

// Re-exports for convenience
pub use backpressure::SaturationMonitor;
pub use buffer::{
    BufferStats, Claimed, GroupSequences, PublishError, RingBuffer, Sequence, WorkerCursor,
};
pub use config::PipelineSettings;
pub use error::{PipelineError, ProcessingError, Result, SubmitError};
pub use group::ConsumerGroup;
pub use metrics::{InMemoryMetrics, MetricsRecorder, MetricsSnapshot, NoopMetrics, StageMetrics};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineState};
pub use stage::{
    ErrorSink, FilterProcessor, LoggingErrorSink, MapProcessor, Passthrough, Processor, Sink, Stage,
    StageRunner,
};
pub use wait::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy, WaitStrategyKind,
    YieldingWaitStrategy,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
