use std::fmt;

use thiserror::Error;

/// Result type for pipeline lifecycle operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors returned by pipeline construction and lifecycle calls
#[derive(Error, Debug)]
pub enum PipelineError {
    /// `start()` was called on a pipeline that is not in the `Created` state
    #[error("Pipeline has already been started")]
    AlreadyStarted,

    /// Sizing or watermark settings are not usable
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// Workers did not finish draining before the deadline
    #[error("Pipeline drain timed out with {pending} worker(s) still running")]
    DrainTimeout { pending: usize },

    /// A worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// A worker thread panicked outside of event processing
    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),

    /// Settings could not be read or deserialized
    #[error("Failed to load settings: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

/// Error raised by a processor or sink for a single event.
///
/// These never leave the stage that produced them; they are handed to the
/// pipeline's error sink and the worker moves on to its next event.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("processor panicked: {0}")]
    Panicked(String),

    /// The stage produced an output but the next buffer no longer accepts events
    #[error("downstream buffer is closed, output dropped")]
    DownstreamClosed,
}

impl ProcessingError {
    pub fn msg(message: impl Into<String>) -> Self {
        ProcessingError::Failed(message.into())
    }
}

/// Error returned by `Pipeline::submit` and `Pipeline::try_submit`.
///
/// The rejected event is handed back so the caller can retry or reroute it.
#[derive(PartialEq, Eq, Clone, Copy)]
pub enum SubmitError<E> {
    /// The ingress buffer had no free slot (non-blocking submit only)
    Full(E),
    /// `stop()` has been initiated; no new events are admitted
    Stopped(E),
    /// The pipeline has not been started yet
    NotRunning(E),
}

impl<E> SubmitError<E> {
    /// Take back the event that was rejected
    pub fn into_inner(self) -> E {
        match self {
            SubmitError::Full(event) | SubmitError::Stopped(event) | SubmitError::NotRunning(event) => {
                event
            }
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, SubmitError::Full(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, SubmitError::Stopped(_))
    }
}

impl<E> fmt::Debug for SubmitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full(_) => f.write_str("Full(..)"),
            SubmitError::Stopped(_) => f.write_str("Stopped(..)"),
            SubmitError::NotRunning(_) => f.write_str("NotRunning(..)"),
        }
    }
}

impl<E> fmt::Display for SubmitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full(_) => f.write_str("ingress buffer is full"),
            SubmitError::Stopped(_) => f.write_str("pipeline is stopping or stopped"),
            SubmitError::NotRunning(_) => f.write_str("pipeline has not been started"),
        }
    }
}

impl<E> std::error::Error for SubmitError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_returns_event() {
        let err = SubmitError::Full(String::from("payload"));
        assert!(err.is_full());
        assert_eq!(err.to_string(), "ingress buffer is full");
        assert_eq!(err.into_inner(), "payload");
    }

    #[test]
    fn test_processing_error_from_boxed() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: ProcessingError = ProcessingError::from(Box::new(io) as Box<dyn std::error::Error + Send + Sync>);
        assert_eq!(err.to_string(), "disk gone");
    }
}
