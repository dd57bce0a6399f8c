use crate::error::{PipelineError, Result};
use crate::wait::{WaitStrategy, WaitStrategyKind};
use crossbeam::utils::CachePadded;
use parking_lot::RwLock;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Publish order of an event within one ring buffer. Never reused.
pub type Sequence = u64;

/// Default bound on a single park of the blocking wait strategy
pub const DEFAULT_MAX_PARK: Duration = Duration::from_millis(50);

const UNPUBLISHED: Sequence = Sequence::MAX;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// Error returned when an event cannot be published; the event is handed back
#[derive(PartialEq, Eq, Clone, Copy)]
pub enum PublishError<E> {
    /// No free slot right now (only from `try_publish`)
    Full(E),
    /// The buffer was shut down or halted
    Closed(E),
}

impl<E> PublishError<E> {
    pub fn into_inner(self) -> E {
        match self {
            PublishError::Full(event) | PublishError::Closed(event) => event,
        }
    }
}

impl<E> fmt::Debug for PublishError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Full(_) => f.write_str("Full(..)"),
            PublishError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<E> fmt::Display for PublishError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Full(_) => f.write_str("ring buffer is full"),
            PublishError::Closed(_) => f.write_str("ring buffer is closed"),
        }
    }
}

impl<E> std::error::Error for PublishError<E> {}

/// One pre-allocated storage cell. `published` holds the sequence whose
/// value currently sits in the cell, or `UNPUBLISHED` before the first write.
pub struct Slot<E> {
    published: AtomicU64,
    value: UnsafeCell<Option<E>>,
}

impl<E> Slot<E> {
    fn new() -> Self {
        Self {
            published: AtomicU64::new(UNPUBLISHED),
            value: UnsafeCell::new(None),
        }
    }
}

/// Progress of one consumer group on a buffer.
///
/// Worker `ordinal` owns every sequence `s` with `s % pool_size == ordinal`
/// and `next[ordinal]` is the lowest of those it has not finished yet.
pub struct GroupSequences {
    pool_size: usize,
    next: Box<[CachePadded<AtomicU64>]>,
    aborted: AtomicBool,
}

impl GroupSequences {
    fn new(pool_size: usize) -> Self {
        let next = (0..pool_size)
            .map(|ordinal| CachePadded::new(AtomicU64::new(ordinal as u64)))
            .collect();
        Self {
            pool_size,
            next,
            aborted: AtomicBool::new(false),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Next sequence worker `ordinal` will claim
    pub fn next_for(&self, ordinal: usize) -> Sequence {
        self.next[ordinal].load(Ordering::Acquire)
    }

    /// Lowest sequence this group has not fully processed; every sequence
    /// below it has been released by its owning worker.
    pub fn fully_processed(&self) -> Sequence {
        self.next
            .iter()
            .map(|next| next.load(Ordering::Acquire))
            .min()
            .unwrap_or(0)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for GroupSequences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupSequences")
            .field("pool_size", &self.pool_size)
            .field("fully_processed", &self.fully_processed())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Claim position of one worker of a group.
///
/// [`RingBuffer::add_group`] hands out exactly one cursor per ordinal and the
/// type is not `Clone`. [`RingBuffer::claim_next`] borrows it mutably for as
/// long as the returned guard lives, so a worker can never hold two claims.
pub struct WorkerCursor {
    buffer_id: u64,
    group: Arc<GroupSequences>,
    ordinal: usize,
}

impl WorkerCursor {
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn group(&self) -> &Arc<GroupSequences> {
        &self.group
    }

    /// Next sequence this worker will claim
    pub fn next(&self) -> Sequence {
        self.group.next_for(self.ordinal)
    }
}

impl fmt::Debug for WorkerCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerCursor")
            .field("ordinal", &self.ordinal)
            .field("pool_size", &self.group.pool_size)
            .field("next", &self.next())
            .finish()
    }
}

/// A claimed, published event. Holding the guard keeps the slot from being
/// overwritten; dropping it releases the sequence to the producers.
pub struct Claimed<'a, E> {
    buffer: &'a RingBuffer<E>,
    cursor: &'a WorkerCursor,
    sequence: Sequence,
    value: &'a E,
}

impl<'a, E> Claimed<'a, E> {
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }
}

impl<E> Deref for Claimed<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.value
    }
}

impl<E> Drop for Claimed<'_, E> {
    fn drop(&mut self) {
        let group = &self.cursor.group;
        group.next[self.cursor.ordinal].store(
            self.sequence + group.pool_size as u64,
            Ordering::Release,
        );
        self.buffer.producer_wait.signal_all();
    }
}

/// Point-in-time view of a buffer's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub name: String,
    pub capacity: u64,
    pub cursor: Sequence,
    pub gating: Sequence,
    pub occupancy: u64,
}

impl BufferStats {
    pub fn remaining_capacity(&self) -> u64 {
        self.capacity - self.occupancy
    }
}

/// Fixed-capacity circular buffer of pre-allocated slots.
///
/// Producers take sequences from an atomic cursor and may write sequence `s`
/// only once every registered group has released `s - capacity`. Each
/// registered [`GroupSequences`] sees every published event exactly once,
/// split across its workers by `sequence % pool_size`.
pub struct RingBuffer<E> {
    id: u64,
    name: String,
    capacity: u64,
    mask: u64,
    slots: Box<[Slot<E>]>,
    cursor: CachePadded<AtomicU64>,
    gating_cache: CachePadded<AtomicU64>,
    groups: RwLock<Vec<Arc<GroupSequences>>>,
    active_producers: AtomicUsize,
    shutdown: AtomicBool,
    halted: AtomicBool,
    producer_wait: Box<dyn WaitStrategy>,
    consumer_wait: Box<dyn WaitStrategy>,
}

// SAFETY: a slot is written only by the producer holding its sequence, after
// every group released the previous occupant (gating), and read only after the
// `published` stamp is observed with Acquire. Readers only ever get `&E`.
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

impl<E> RingBuffer<E> {
    /// Create a buffer using the blocking wait strategy
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        Self::with_wait_strategy(name, capacity, WaitStrategyKind::Blocking, DEFAULT_MAX_PARK)
    }

    pub fn with_wait_strategy(
        name: impl Into<String>,
        capacity: usize,
        kind: WaitStrategyKind,
        max_park: Duration,
    ) -> Result<Self> {
        let name = name.into();
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PipelineError::InvalidConfig(format!(
                "capacity of buffer '{name}' must be a non-zero power of two, got {capacity}"
            )));
        }

        Ok(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            name,
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            slots: (0..capacity).map(|_| Slot::new()).collect(),
            cursor: CachePadded::new(AtomicU64::new(0)),
            gating_cache: CachePadded::new(AtomicU64::new(0)),
            groups: RwLock::new(Vec::new()),
            active_producers: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            producer_wait: kind.build(max_park),
            consumer_wait: kind.build(max_park),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a consumer group that gates producers and return one cursor
    /// per worker, indexed by ordinal.
    ///
    /// Groups must be registered before the first publish so that every group
    /// observes the buffer from sequence 0.
    pub fn add_group(&self, pool_size: usize) -> Result<Vec<WorkerCursor>> {
        if pool_size == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "consumer group on buffer '{}' needs at least one worker",
                self.name
            )));
        }

        let mut groups = self.groups.write();
        if self.cursor.load(Ordering::SeqCst) != 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "consumer group registered on buffer '{}' after publishing started",
                self.name
            )));
        }
        let group = Arc::new(GroupSequences::new(pool_size));
        groups.push(Arc::clone(&group));
        Ok((0..pool_size)
            .map(|ordinal| WorkerCursor {
                buffer_id: self.id,
                group: Arc::clone(&group),
                ordinal,
            })
            .collect())
    }

    /// Abort `group` and stop it from gating producers.
    ///
    /// Only for groups none of whose workers can still claim: a claim in
    /// flight during removal could see its slot overwritten.
    pub(crate) fn remove_group(&self, group: &Arc<GroupSequences>) {
        group.abort();
        let removed = {
            let mut groups = self.groups.write();
            let before = groups.len();
            groups.retain(|registered| !Arc::ptr_eq(registered, group));
            before - groups.len()
        };
        if removed > 0 {
            debug!(buffer = %self.name, pool_size = group.pool_size, "consumer group removed");
        }
        self.producer_wait.signal_all();
        self.consumer_wait.signal_all();
    }

    /// Publish an event, blocking while the buffer is full.
    ///
    /// Fails only if the buffer has been shut down before the event was
    /// admitted, or halted while waiting for a free slot.
    pub fn publish(&self, event: E) -> std::result::Result<Sequence, PublishError<E>> {
        let Some(_permit) = self.admit() else {
            return Err(PublishError::Closed(event));
        };

        let sequence = self.cursor.fetch_add(1, Ordering::SeqCst);
        let mut halted = false;
        self.producer_wait.wait_until(&mut || {
            if self.has_capacity(sequence) {
                return true;
            }
            halted = self.halted.load(Ordering::SeqCst);
            halted
        });
        if halted {
            return Err(PublishError::Closed(event));
        }

        self.write(sequence, event);
        Ok(sequence)
    }

    /// Publish without blocking; returns `Full` when no slot is free
    pub fn try_publish(&self, event: E) -> std::result::Result<Sequence, PublishError<E>> {
        let Some(_permit) = self.admit() else {
            return Err(PublishError::Closed(event));
        };

        let mut current = self.cursor.load(Ordering::SeqCst);
        loop {
            if !self.has_capacity(current) {
                return Err(PublishError::Full(event));
            }
            match self.cursor.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.write(current, event);
        Ok(current)
    }

    /// Wait for the next sequence owned by `cursor`'s worker.
    ///
    /// Returns `None` once the buffer is shut down and every admitted event
    /// up to the final cursor has been claimed, or when the buffer is halted
    /// or the group aborted. A cursor issued by another buffer never claims.
    pub fn claim_next<'a>(&'a self, cursor: &'a mut WorkerCursor) -> Option<Claimed<'a, E>> {
        if cursor.buffer_id != self.id {
            debug!(buffer = %self.name, "claim with a cursor of another buffer refused");
            return None;
        }
        let cursor: &'a WorkerCursor = cursor;
        let group = &*cursor.group;
        if group.is_aborted() {
            return None;
        }
        let sequence = group.next_for(cursor.ordinal);
        let slot = self.slot(sequence);

        let mut available = false;
        self.consumer_wait.wait_until(&mut || {
            if slot.published.load(Ordering::Acquire) == sequence {
                available = true;
                return true;
            }
            self.halted.load(Ordering::SeqCst) || group.is_aborted() || self.is_drained_at(sequence)
        });
        if !available {
            return None;
        }

        // SAFETY: the stamp matched, so the write of `sequence` is visible and
        // the slot cannot be rewritten until this claim is released.
        let value = unsafe { (*slot.value.get()).as_ref()? };
        Some(Claimed {
            buffer: self,
            cursor,
            sequence,
            value,
        })
    }

    /// Stop admitting new events; consumers drain what was admitted
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            debug!(buffer = %self.name, cursor = self.cursor(), "ring buffer shut down");
        }
        self.consumer_wait.signal_all();
    }

    /// Give up on outstanding work: wake every parked producer and consumer
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            debug!(buffer = %self.name, cursor = self.cursor(), "ring buffer halted");
        }
        self.producer_wait.signal_all();
        self.consumer_wait.signal_all();
    }

    /// Ask one group's workers to stop after their current event
    pub fn abort_group(&self, group: &GroupSequences) {
        group.abort();
        self.consumer_wait.signal_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Next sequence to be handed to a producer
    pub fn cursor(&self) -> Sequence {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Lowest sequence not yet processed by every registered group; with no
    /// group registered, nothing gates and this is the cursor
    pub fn gating_sequence(&self) -> Sequence {
        let gating = self
            .groups
            .read()
            .iter()
            .map(|group| group.fully_processed())
            .min()
            .unwrap_or_else(|| self.cursor());
        let cached = self.gating_cache.fetch_max(gating, Ordering::AcqRel);
        gating.max(cached)
    }

    /// Number of slots holding sequences some group has not finished
    pub fn occupancy(&self) -> u64 {
        let gating = self.gating_sequence();
        self.cursor().saturating_sub(gating).min(self.capacity)
    }

    pub fn remaining_capacity(&self) -> u64 {
        self.capacity - self.occupancy()
    }

    /// Occupancy as a percentage (0-100)
    pub fn utilization(&self) -> u32 {
        ((self.occupancy() * 100) / self.capacity) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    /// Whether publishing `sequence` used the last free slot. The gating
    /// groups are only consulted when the cached gating sequence says so.
    pub(crate) fn is_full_after(&self, sequence: Sequence) -> bool {
        let full = |gating: Sequence| (sequence + 1).saturating_sub(gating) >= self.capacity;
        full(self.gating_cache.load(Ordering::Acquire)) && full(self.gating_sequence())
    }

    pub fn stats(&self) -> BufferStats {
        let gating = self.gating_sequence();
        let cursor = self.cursor();
        BufferStats {
            name: self.name.clone(),
            capacity: self.capacity,
            cursor,
            gating,
            occupancy: cursor.saturating_sub(gating).min(self.capacity),
        }
    }

    fn admit(&self) -> Option<ProducerPermit<'_, E>> {
        self.active_producers.fetch_add(1, Ordering::SeqCst);
        let permit = ProducerPermit { buffer: self };
        if self.shutdown.load(Ordering::SeqCst) || self.halted.load(Ordering::SeqCst) {
            return None;
        }
        Some(permit)
    }

    fn has_capacity(&self, sequence: Sequence) -> bool {
        if sequence < self.capacity {
            return true;
        }
        let wrap_point = sequence - self.capacity;
        if wrap_point < self.gating_cache.load(Ordering::Acquire) {
            return true;
        }
        wrap_point < self.gating_sequence()
    }

    fn is_drained_at(&self, sequence: Sequence) -> bool {
        self.shutdown.load(Ordering::SeqCst)
            && self.active_producers.load(Ordering::SeqCst) == 0
            && self.cursor.load(Ordering::SeqCst) <= sequence
    }

    fn slot(&self, sequence: Sequence) -> &Slot<E> {
        &self.slots[(sequence & self.mask) as usize]
    }

    fn write(&self, sequence: Sequence, event: E) {
        let slot = self.slot(sequence);
        // SAFETY: `has_capacity(sequence)` held, so every group released the
        // previous occupant and no other producer owns this sequence.
        unsafe {
            *slot.value.get() = Some(event);
        }
        slot.published.store(sequence, Ordering::Release);
        self.consumer_wait.signal_all();
    }
}

impl<E> fmt::Debug for RingBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor())
            .field("shutdown", &self.is_shutdown())
            .field("halted", &self.is_halted())
            .finish()
    }
}

/// Counts a producer as in flight so that consumers keep draining until it
/// has either written its slot or backed out.
struct ProducerPermit<'a, E> {
    buffer: &'a RingBuffer<E>,
}

impl<E> Drop for ProducerPermit<'_, E> {
    fn drop(&mut self) {
        self.buffer.active_producers.fetch_sub(1, Ordering::SeqCst);
        self.buffer.consumer_wait.signal_all();
    }
}
