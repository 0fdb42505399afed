//! Bounded blocking FIFO queues for event delivery.
//!
//! Each routing task draws event pointers from exactly one `SyncQueue`. The
//! queue is deliberately small in surface: blocking `push`/`pop` for driver
//! loops, deadline-bounded `timed_push`/`timed_pop` for loops that must also
//! observe shutdown flags, and non-blocking `try_push`/`try_pop` for callers
//! that are not allowed to wait (interrupt-style contexts reject on a full
//! queue instead of blocking).
//!
//! The implementation is a mutex-protected ring with two condvars. Writers
//! notify readers after every push; readers notify writers after every pop so
//! capacity waiters wake promptly. Notification uses `notify_all` rather than
//! `notify_one`: queues are MPMC and a single-wakeup policy can strand a
//! waiter when producers and consumers share a condvar edge.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const POISONED: &str = "queue mutex poisoned";

/// A bounded multi-producer multi-consumer FIFO.
///
/// Capacity is fixed at construction; `push` blocks when the queue is full
/// and `pop` blocks when it is empty.
pub struct SyncQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> SyncQueue<T> {
    /// Creates a queue holding at most `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; a zero-capacity queue could never
    /// complete a push.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Blocks until there is space, then appends `value`.
    pub fn push(&self, value: T) {
        let mut items = self.lock();
        while items.len() == self.capacity {
            tracing::trace!(target: "router.queue", capacity = self.capacity, "push_blocked");
            items = self.not_full.wait(items).expect(POISONED);
        }
        items.push_back(value);
        self.not_empty.notify_all();
    }

    /// Appends `value` if there is space, or hands it back if the queue is
    /// full. Never blocks.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut items = self.lock();
        if items.len() == self.capacity {
            return Err(value);
        }
        items.push_back(value);
        self.not_empty.notify_all();
        Ok(())
    }

    /// Appends `value`, waiting up to `timeout` for space. Hands the value
    /// back on expiry.
    pub fn timed_push(&self, value: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.lock();
        while items.len() == self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(value);
            }
            let (guard, _) = self
                .not_full
                .wait_timeout(items, deadline - now)
                .expect(POISONED);
            items = guard;
        }
        items.push_back(value);
        self.not_empty.notify_all();
        Ok(())
    }

    /// Blocks until there is a value to read, then returns it.
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(value) = items.pop_front() {
                self.not_full.notify_all();
                return value;
            }
            items = self.not_empty.wait(items).expect(POISONED);
        }
    }

    /// Returns the front value if one is present. Never blocks.
    pub fn try_pop(&self) -> Option<T> {
        let mut items = self.lock();
        let value = items.pop_front();
        if value.is_some() {
            self.not_full.notify_all();
        }
        value
    }

    /// Returns the front value, waiting up to `timeout` for one to arrive.
    /// Returns `None` on expiry; expiry is an expected outcome, not an error.
    pub fn timed_pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.lock();
        loop {
            if let Some(value) = items.pop_front() {
                self.not_full.notify_all();
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(items, deadline - now)
                .expect(POISONED);
            items = guard;
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().expect(POISONED)
    }
}
