//! Counting semaphore.
//!
//! A non-negative count guarded by a single lock plus a condition variable.
//! `post` wakes every blocked waiter; each waiter re-checks the count under
//! the lock and only one of them consumes a given unit. Wake-all keeps the
//! re-check loop the only place that decides who proceeds, which rules out
//! lost wakeups. It is not fair under heavy contention: a waiter can lose the
//! race repeatedly. Do not switch to single-wake without keeping the re-check.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Thread-safe counting semaphore with optional timeouts.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    /// Create a semaphore with an initial count.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Increment the count and wake all blocked waiters.
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cond.notify_all();
    }

    /// Block until the count is positive, then decrement it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cond.wait(&mut count);
        }
        *count -= 1;
    }

    /// Block for at most `timeout`. Returns `false` if the count stayed zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        // Overflowing deadlines (e.g. Duration::MAX) degrade to an unbounded wait
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };

        let mut count = self.count.lock();
        while *count == 0 {
            if self.cond.wait_until(&mut count, deadline).timed_out() {
                // A post may have landed right at the deadline
                if *count == 0 {
                    return false;
                }
                break;
            }
        }
        *count -= 1;
        true
    }

    /// Decrement without blocking. Returns `false` if the count was zero.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Snapshot of the current count.
    pub fn value(&self) -> usize {
        *self.count.lock()
    }
}
