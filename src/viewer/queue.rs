//! Bounded FIFO through which any thread hands work to the owner thread.
//!
//! All mutations of the queue contents happen under one mutex. Producers
//! that cannot afford a drop use [`CommandQueue::enqueue_blocking`], which
//! parks on a condition variable until a slot frees up.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Capacity used when no explicit capacity is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Items that can be collapsed into an already queued equivalent.
pub trait Coalesce {
    fn coalesces_with(&self, other: &Self) -> bool;
}

/// Rejected enqueue; the item is handed back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueError<T> {
    Full(T),
    Duplicate(T),
    Closed(T),
}

impl<T> EnqueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Duplicate(item) | Self::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

#[derive(Debug)]
pub struct CommandQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> CommandQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Appends `item` unless the queue is full or closed. Never blocks
    /// beyond the mutex.
    pub fn enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        let mut state = self.lock();
        self.push_locked(&mut state, item)
    }

    /// Blocks until a slot is free, then appends `item`. Only a closed queue
    /// makes this fail.
    pub fn enqueue_blocking(&self, item: T) -> Result<(), EnqueueError<T>> {
        let mut state = self.lock();
        while !state.closed && state.items.len() >= self.capacity {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        self.push_locked(&mut state, item)
    }

    /// Removes the oldest item, or returns `None` when empty.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Waits up to `timeout` for the queue to become non-empty or closed.
    /// Returns whether an item is available.
    pub fn wait_for_item(&self, timeout: Duration) -> bool {
        let state = self.lock();
        if !state.items.is_empty() || state.closed {
            return !state.items.is_empty();
        }
        let (state, _) = self
            .not_empty
            .wait_timeout_while(state, timeout, |s| s.items.is_empty() && !s.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !state.items.is_empty()
    }

    /// Rejects all further enqueues. Queued items stay available to
    /// `dequeue`. Wakes every blocked producer and waiter.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Removes every queued item, e.g. when the consumer is gone and the
    /// items must be released so their producers unblock.
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.lock();
        let drained: Vec<T> = state.items.drain(..).collect();
        drop(state);
        self.not_full.notify_all();
        drained
    }

    fn push_locked(
        &self,
        state: &mut MutexGuard<'_, QueueState<T>>,
        item: T,
    ) -> Result<(), EnqueueError<T>> {
        if state.closed {
            return Err(EnqueueError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(EnqueueError::Full(item));
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // Every critical section leaves the deque consistent, so a panic in
        // another holder does not invalidate it.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Coalesce> CommandQueue<T> {
    /// Appends `item` only if nothing equivalent is queued. The scan and the
    /// append happen under the same lock. A closed queue rejects before the
    /// scan.
    pub fn enqueue_unique_or_drop(&self, item: T) -> Result<(), EnqueueError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(EnqueueError::Closed(item));
        }
        if state.items.iter().any(|queued| queued.coalesces_with(&item)) {
            return Err(EnqueueError::Duplicate(item));
        }
        self.push_locked(&mut state, item)
    }
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
