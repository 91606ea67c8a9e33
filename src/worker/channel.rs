//! # Bounded Channel
//!
//! Fixed-capacity multi-producer/multi-consumer queue shared between workers.
//!
//! Every item moves from one producer to exactly one consumer. The queue
//! itself sits behind a short-lived `std::sync::Mutex` that is never held
//! across an `.await`; blocked producers and consumers park on
//! [`tokio::sync::Notify`] instead.
//!
//! ## Shutdown drain
//!
//! [`BoundedChannel::fill_and_drain`] implements the shutdown protocol: top the
//! queue up with filler items so every parked consumer wakes, then drain until
//! empty so every parked producer gets room. The supervisor calls it on each
//! channel in sink-to-source order after requesting exit.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Rejected put; the item is handed back, never dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError<T> {
    /// Channel was at capacity
    #[error("channel is full")]
    Full(T),

    /// No room appeared before the deadline
    #[error("timed out waiting for channel capacity")]
    Timeout(T),
}

impl<T> ChannelError<T> {
    /// Returns the item that could not be queued.
    pub fn into_inner(self) -> T {
        match self {
            ChannelError::Full(item) | ChannelError::Timeout(item) => item,
        }
    }
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    /// `None` means unbounded
    capacity: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
}

/// Cloneable handle to a bounded MPMC queue.
///
/// # Examples
///
/// ```
/// use vehicle_supervisor::worker::channel::BoundedChannel;
///
/// let channel = BoundedChannel::new(2);
/// channel.try_put(1).unwrap();
/// channel.try_put(2).unwrap();
/// assert!(channel.try_put(3).is_err());
///
/// assert_eq!(channel.try_get(), Some(1));
/// assert_eq!(channel.drain(), vec![2]);
/// ```
pub struct BoundedChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

impl<T> BoundedChannel<T> {
    /// Creates a channel holding at most `max_size` items.
    ///
    /// `max_size <= 0` creates an unbounded channel.
    #[must_use]
    pub fn new(max_size: i64) -> Self {
        let capacity = usize::try_from(max_size).ok().filter(|&n| n > 0);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity.unwrap_or(0))),
                capacity,
                not_empty: Notify::new(),
                not_full: Notify::new(),
            }),
        }
    }

    /// Maximum number of queued items, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Queues `item` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Full`] carrying the item when at capacity.
    pub fn try_put(&self, item: T) -> Result<(), ChannelError<T>> {
        self.push(item).map_err(ChannelError::Full)
    }

    /// Queues `item`, waiting for room while the channel is full.
    pub async fn put(&self, item: T) {
        let mut item = item;
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.push(item) {
                Ok(()) => return,
                Err(rejected) => item = rejected,
            }
            notified.await;
        }
    }

    /// Queues `item`, waiting at most `timeout` for room.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Timeout`] carrying the item if no room appeared.
    pub async fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), ChannelError<T>> {
        let deadline = Instant::now() + timeout;
        let mut item = item;
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.push(item) {
                Ok(()) => return Ok(()),
                Err(rejected) => item = rejected,
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(ChannelError::Timeout(item));
            }
        }
    }

    /// Takes the oldest item without waiting.
    pub fn try_get(&self) -> Option<T> {
        let item = self.queue().pop_front();
        if item.is_some() {
            self.shared.not_full.notify_one();
        }
        item
    }

    /// Takes the oldest item, waiting while the channel is empty.
    pub async fn get(&self) -> T {
        loop {
            let notified = self.shared.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_get() {
                return item;
            }
            notified.await;
        }
    }

    /// Takes the oldest item, waiting at most `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.shared.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_get() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Removes and returns everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = self.queue().drain(..).collect();
        if !items.is_empty() {
            self.shared.not_full.notify_waiters();
        }
        items
    }

    /// Shutdown drain: fill remaining capacity with `filler`, then drain until empty.
    ///
    /// Filling wakes every consumer parked on an empty queue; draining frees
    /// every producer parked on a full one. Returns the number of items removed,
    /// fillers included. Callers must request exit first so woken workers stop
    /// instead of producing again.
    pub async fn fill_and_drain<F>(&self, mut filler: F) -> usize
    where
        F: FnMut() -> T,
    {
        let room = match self.shared.capacity {
            Some(capacity) => capacity.saturating_sub(self.len()),
            None => 1,
        };
        for _ in 0..room {
            if self.push(filler()).is_err() {
                break;
            }
        }
        self.shared.not_empty.notify_waiters();
        tokio::task::yield_now().await;

        let mut removed = 0;
        loop {
            let batch = self.drain();
            if batch.is_empty() {
                return removed;
            }
            removed += batch.len();
            tokio::task::yield_now().await;
        }
    }

    fn push(&self, item: T) -> Result<(), T> {
        {
            let mut queue = self.queue();
            if let Some(capacity) = self.shared.capacity {
                if queue.len() >= capacity {
                    return Err(item);
                }
            }
            queue.push_back(item);
        }
        self.shared.not_empty.notify_one();
        Ok(())
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Queue operations cannot panic mid-update, so a poisoned lock still holds a valid queue
        self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
