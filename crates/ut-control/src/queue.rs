//! Bounded FIFO between the transport and the dispatch thread.
//!
//! Producers never block: a full queue rejects the message, counts it as
//! dropped, and reports [`EnqueueError::Full`] so HTTP senders can be told.
//! The exit sentinel bypasses the bound so a stop request cannot be lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::message::Message;

const QUEUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

/// Reasons a message was not enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The queue holds `capacity` messages already.
    #[error("message queue is full ({capacity} messages)")]
    Full {
        /// Queue bound.
        capacity: usize,
    },
    /// The queue was closed by a forced shutdown.
    #[error("message queue is closed")]
    Closed,
}

#[derive(Debug)]
struct QueueState {
    messages: VecDeque<Message>,
    closed: bool,
}

/// Bounded message queue guarded by a mutex and a condition variable.
#[derive(Debug)]
pub struct MessageQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl MessageQueue {
    /// Creates a queue holding at most `capacity` messages.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `message` and wakes one waiter.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] at capacity and [`EnqueueError::Closed`]
    /// after [`MessageQueue::close`]. Either way the message is dropped and
    /// counted.
    pub fn enqueue(&self, message: Message) -> Result<(), EnqueueError> {
        let mut state = self.lock();
        let rejection = if state.closed {
            Some(EnqueueError::Closed)
        } else if state.messages.len() >= self.capacity {
            Some(EnqueueError::Full {
                capacity: self.capacity,
            })
        } else {
            None
        };
        if let Some(error) = rejection {
            drop(state);
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(target: QUEUE_TARGET, %error, dropped, "message dropped");
            return Err(error);
        }
        state.messages.push_back(message);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Appends [`Message::ExitRequested`], ignoring the bound.
    pub fn push_exit(&self) {
        self.lock().messages.push_back(Message::ExitRequested);
        self.available.notify_one();
        debug!(target: QUEUE_TARGET, "exit requested");
    }

    /// Removes the head, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub fn dequeue(&self) -> Option<Message> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(message) = state.messages.pop_front() {
                return Some(message);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue and wakes every waiter. Pending messages stay queued
    /// but are no longer handed out.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    /// Accepts messages again after [`MessageQueue::close`].
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Discards every pending message, returning how many were removed.
    #[must_use = "the count reports how many messages were discarded"]
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.messages.len();
        state.messages.clear();
        removed
    }

    /// Number of pending messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue bound.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages rejected since the queue was created.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
