// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded hand-off between event producers and the aggregation cycle.
//!
//! The buffer is a monitor: a single mutex guards the event list, and every mutation goes
//! through [`EventBuffer::add`], [`EventBuffer::try_add`] or [`EventBuffer::drain`]. A drain
//! swaps the list out under the lock, so an insert racing with it lands either in the
//! snapshot or in the buffer afterwards, never both and never neither.
//!
//! When the buffer is full, [`EventBuffer::add`] either waits for the next drain
//! (backpressure enabled) or hands the event back as [`BufferError::Full`] and bumps the
//! [`EventBuffer::rejected`] counter (backpressure disabled).

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::errors::BufferError;
use crate::event::Event;

/// Maximum number of events the buffer holds between two drains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capacity {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl Capacity {
    /// `0` means unbounded.
    pub fn from_limit(limit: usize) -> Self {
        NonZeroUsize::new(limit).map_or(Capacity::Unbounded, Capacity::Bounded)
    }

    fn limit(self) -> usize {
        match self {
            Capacity::Bounded(limit) => limit.get(),
            Capacity::Unbounded => usize::MAX,
        }
    }
}

enum Insert {
    Done,
    AtCapacity(Event),
}

pub struct EventBuffer {
    events: Mutex<Vec<Event>>,
    // Mirrors `events.len()`, written under the lock, read without it.
    len: AtomicUsize,
    rejected: AtomicU64,
    capacity: Capacity,
    backpressure: bool,
    space_available: Notify,
    closed: CancellationToken,
}

impl EventBuffer {
    pub fn new(capacity: Capacity, backpressure: bool) -> Self {
        EventBuffer {
            events: Mutex::new(Vec::new()),
            len: AtomicUsize::new(0),
            rejected: AtomicU64::new(0),
            capacity,
            backpressure,
            space_available: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(Capacity::Unbounded, false)
    }

    /// Inserts one event.
    ///
    /// At capacity this waits for a drain when backpressure is enabled, and fails with
    /// [`BufferError::Full`] otherwise. Waiting is cancel safe: dropping the future leaves
    /// the buffer untouched, and [`EventBuffer::close`] wakes every waiting producer with
    /// [`BufferError::Closed`].
    pub async fn add(&self, mut event: Event) -> Result<(), BufferError> {
        loop {
            // Register for the wakeup before looking at the list so a drain that lands
            // between the check and the wait is not missed.
            let space = self.space_available.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.try_insert(event)? {
                Insert::Done => return Ok(()),
                Insert::AtCapacity(rejected) if !self.backpressure => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(BufferError::Full(rejected));
                }
                Insert::AtCapacity(waiting) => event = waiting,
            }

            trace!("Buffer full, waiting for drain");
            tokio::select! {
                () = &mut space => {}
                () = self.closed.cancelled() => return Err(BufferError::Closed(event)),
            }
        }
    }

    /// Inserts one event without waiting, whatever the backpressure mode.
    pub fn try_add(&self, event: Event) -> Result<(), BufferError> {
        match self.try_insert(event)? {
            Insert::Done => Ok(()),
            Insert::AtCapacity(rejected) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(BufferError::Full(rejected))
            }
        }
    }

    fn try_insert(&self, event: Event) -> Result<Insert, BufferError> {
        let mut events = self.lock()?;
        if self.closed.is_cancelled() {
            return Err(BufferError::Closed(event));
        }
        if events.len() >= self.capacity.limit() {
            return Ok(Insert::AtCapacity(event));
        }
        events.push(event);
        self.len.store(events.len(), Ordering::Relaxed);
        Ok(Insert::Done)
    }

    /// Takes every buffered event and leaves the buffer empty, as one atomic step.
    ///
    /// The lock is held only to swap the list out. Producers waiting for space are woken
    /// once the lock is released.
    pub fn drain(&self) -> Result<Vec<Event>, BufferError> {
        let snapshot = {
            let mut events = self.lock()?;
            self.len.store(0, Ordering::Relaxed);
            std::mem::take(&mut *events)
        };
        if !snapshot.is_empty() {
            self.space_available.notify_waiters();
        }
        Ok(snapshot)
    }

    /// Stops accepting events. Producers waiting for space fail with
    /// [`BufferError::Closed`]; buffered events can still be drained.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Relaxed view of the number of buffered events, for reporting only.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events turned away because the buffer was full.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn backpressure(&self) -> bool {
        self.backpressure
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Event>>, BufferError> {
        self.events.lock().map_err(|_| BufferError::Poisoned)
    }
}
