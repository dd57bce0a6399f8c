use crate::buffer::{GroupSequences, RingBuffer, Sequence, WorkerCursor};
use crate::error::{PipelineError, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;

/// A fixed pool of worker threads reading one ring buffer.
///
/// Worker `ordinal` handles exactly the sequences `s` with
/// `s % pool_size == ordinal`, so the pool as a whole sees every published
/// event once and no two workers ever touch the same event. The pool size is
/// fixed for the life of the group.
pub struct ConsumerGroup<E> {
    name: String,
    buffer: Arc<RingBuffer<E>>,
    sequences: Arc<GroupSequences>,
    handles: Vec<Option<JoinHandle<()>>>,
    exits: Receiver<usize>,
    running: usize,
}

impl<E> ConsumerGroup<E>
where
    E: Send + Sync + 'static,
{
    /// Register a group on `buffer` and spawn its workers.
    ///
    /// Returns once every worker thread is running. Threads are named
    /// `<name>-<ordinal>`. `handler` receives the worker ordinal, the sequence
    /// and the event.
    pub fn spawn<H>(
        name: impl Into<String>,
        buffer: Arc<RingBuffer<E>>,
        pool_size: usize,
        handler: Arc<H>,
    ) -> Result<Self>
    where
        H: Fn(usize, Sequence, &E) + Send + Sync + 'static,
    {
        let name = name.into();
        let cursors = buffer.add_group(pool_size)?;
        let sequences = match cursors.first() {
            Some(cursor) => Arc::clone(cursor.group()),
            None => {
                return Err(PipelineError::InvalidConfig(format!(
                    "consumer group '{name}' has no workers"
                )))
            }
        };
        let (ready_tx, ready_rx) = channel::bounded(pool_size);
        let (exit_tx, exit_rx) = channel::bounded(pool_size);

        let mut handles = Vec::with_capacity(pool_size);
        for cursor in cursors {
            let ordinal = cursor.ordinal();
            let worker = Worker {
                group: name.clone(),
                buffer: Arc::clone(&buffer),
                cursor,
                handler: Arc::clone(&handler),
            };
            let ready_tx = ready_tx.clone();
            let exit_tx = exit_tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("{name}-{ordinal}"))
                .spawn(move || {
                    let _exit = ExitNotice { ordinal, tx: exit_tx };
                    let _ = ready_tx.send(ordinal);
                    drop(ready_tx);
                    worker.run();
                });

            match spawned {
                Ok(handle) => handles.push(Some(handle)),
                Err(err) => {
                    abandon(&buffer, &sequences, handles);
                    return Err(PipelineError::ThreadSpawn(err));
                }
            }
        }
        drop(ready_tx);
        drop(exit_tx);

        for _ in 0..pool_size {
            if ready_rx.recv().is_err() {
                abandon(&buffer, &sequences, handles);
                return Err(PipelineError::WorkerPanicked(format!(
                    "worker of group '{name}' exited before reporting ready"
                )));
            }
        }
        debug!(group = %name, pool_size, buffer = %buffer.name(), "consumer group running");

        Ok(Self {
            name,
            buffer,
            sequences,
            handles,
            exits: exit_rx,
            running: pool_size,
        })
    }
}

/// Tear down a group that failed to start: stop and join the workers that did
/// spawn, then unregister the group so it no longer gates producers.
fn abandon<E>(
    buffer: &RingBuffer<E>,
    sequences: &Arc<GroupSequences>,
    handles: Vec<Option<JoinHandle<()>>>,
) {
    buffer.abort_group(sequences);
    for handle in handles.into_iter().flatten() {
        let _ = handle.join();
    }
    buffer.remove_group(sequences);
    debug!(buffer = %buffer.name(), "consumer group abandoned during startup");
}

impl<E> ConsumerGroup<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_size(&self) -> usize {
        self.sequences.pool_size()
    }

    pub fn sequences(&self) -> &GroupSequences {
        &self.sequences
    }

    /// Workers that have not exited yet
    pub fn running(&self) -> usize {
        self.running
    }

    pub fn is_finished(&self) -> bool {
        self.running == 0
    }

    /// Ask workers to exit after the event they are processing, if any
    pub fn abort(&self) {
        self.buffer.abort_group(&self.sequences);
    }

    /// Wait for every worker to leave its loop, then join the threads.
    ///
    /// Workers only leave once the buffer is shut down and drained, or the
    /// group is aborted. With a deadline, returns `DrainTimeout` if some
    /// workers are still running when it passes; calling again later picks up
    /// where this call stopped.
    pub fn await_exit(&mut self, deadline: Option<Instant>) -> Result<()> {
        while self.running > 0 {
            let received = match deadline {
                Some(deadline) => match self.exits.recv_deadline(deadline) {
                    Ok(ordinal) => Some(ordinal),
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(PipelineError::DrainTimeout {
                            pending: self.running,
                        })
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                },
                None => self.exits.recv().ok(),
            };
            match received {
                Some(_) => self.running -= 1,
                None => {
                    self.running = 0;
                }
            }
        }

        let mut panicked = None;
        for handle in self.handles.iter_mut().filter_map(Option::take) {
            if let Err(payload) = handle.join() {
                panicked.get_or_insert_with(|| panic_message(payload.as_ref()));
            }
        }
        debug!(group = %self.name, "consumer group exited");

        match panicked {
            Some(message) => Err(PipelineError::WorkerPanicked(format!(
                "group '{}': {message}",
                self.name
            ))),
            None => Ok(()),
        }
    }
}

impl<E> Drop for ConsumerGroup<E> {
    fn drop(&mut self) {
        if self.running > 0 {
            self.abort();
        }
    }
}

struct Worker<E, H> {
    group: String,
    buffer: Arc<RingBuffer<E>>,
    cursor: WorkerCursor,
    handler: Arc<H>,
}

impl<E, H> Worker<E, H>
where
    H: Fn(usize, Sequence, &E),
{
    fn run(mut self) {
        let ordinal = self.cursor.ordinal();
        debug!(group = %self.group, ordinal, "worker started");
        let mut handled = 0u64;
        while let Some(claimed) = self.buffer.claim_next(&mut self.cursor) {
            (self.handler)(ordinal, claimed.sequence(), &*claimed);
            handled += 1;
        }
        debug!(group = %self.group, ordinal, handled, "worker exiting");
    }
}

/// Reports a worker's exit when dropped, so a panicking worker still counts
struct ExitNotice {
    ordinal: usize,
    tx: Sender<usize>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(self.ordinal);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
