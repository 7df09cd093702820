use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::error::PipelineError;

/// Returned by queue operations after [`BoundedQueue::cancel`] has been called.
///
/// Stages treat this exactly like receiving an end-of-stream marker: wind
/// down and propagate termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue operation aborted by shutdown")]
pub struct Cancelled;

/// A fixed-capacity FIFO channel with blocking hand-off.
///
/// [`enqueue`](BoundedQueue::enqueue) blocks while the queue is full and
/// [`dequeue`](BoundedQueue::dequeue) blocks while it is empty, so the number
/// of in-flight items never exceeds the capacity chosen at construction.
/// Capacity and availability are tracked by two condition variables standing
/// in for counting permit pools; a single mutex serializes the underlying
/// list mutation and is never held across a wait.
///
/// Cloning yields another handle to the same queue, safe to use from any
/// number of producer and consumer threads. Items are delivered in the order
/// their insertions completed, each to exactly one consumer.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    cancelled: bool,
    blocked_enqueues: u64,
    blocked_dequeues: u64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` in-flight items.
    ///
    /// A capacity of zero is rejected at construction.
    pub fn new(capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidCapacity);
        }
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    cancelled: false,
                    blocked_enqueues: 0,
                    blocked_dequeues: 0,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Append an item, waiting until free capacity exists.
    ///
    /// Returns `Err(Cancelled)` once the queue has been cancelled; the item
    /// is dropped in that case.
    pub fn enqueue(&self, item: T) -> Result<(), Cancelled> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if state.items.len() == shared.capacity && !state.cancelled {
            state.blocked_enqueues += 1;
            while state.items.len() == shared.capacity && !state.cancelled {
                shared.not_full.wait(&mut state);
            }
        }
        if state.cancelled {
            return Err(Cancelled);
        }
        state.items.push_back(item);
        drop(state);
        shared.not_empty.notify_one();
        Ok(())
    }

    /// Remove and return the head item, waiting until one is available.
    ///
    /// Each item is delivered to exactly one caller. Returns
    /// `Err(Cancelled)` once the queue has been cancelled, even if items
    /// remain queued.
    pub fn dequeue(&self) -> Result<T, Cancelled> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if state.items.is_empty() && !state.cancelled {
            state.blocked_dequeues += 1;
            while state.items.is_empty() && !state.cancelled {
                shared.not_empty.wait(&mut state);
            }
        }
        if state.cancelled {
            return Err(Cancelled);
        }
        // non-empty is guaranteed by the wait predicate
        let item = state.items.pop_front().ok_or(Cancelled)?;
        drop(state);
        shared.not_full.notify_one();
        Ok(item)
    }

    /// Wake every blocked waiter and fail all subsequent operations.
    ///
    /// Queued items are abandoned. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.cancelled = true;
        drop(state);
        self.shared.not_full.notify_all();
        self.shared.not_empty.notify_all();
    }

    /// Whether [`cancel`](BoundedQueue::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.shared.state.lock().cancelled
    }

    /// Current number of queued items
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    /// Whether the queue currently holds no items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of in-flight items
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// How many enqueue calls had to wait for free capacity
    pub fn blocked_enqueues(&self) -> u64 {
        self.shared.state.lock().blocked_enqueues
    }

    /// How many dequeue calls had to wait for an item
    pub fn blocked_dequeues(&self) -> u64 {
        self.shared.state.lock().blocked_dequeues
    }
}
