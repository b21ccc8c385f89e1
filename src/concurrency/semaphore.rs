//! Counting semaphore / latch (spec.md §4.6): mutex + condvar backed
//! `acquire(n)`, `try_acquire(n)`, `try_acquire_timed(n, ms)`, `release(n)`.
//! A zero-initialised one doubles as a latch: `acquire(1)` blocks until
//! someone releases it open.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

pub struct Semaphore {
    count: Mutex<u64>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(initial: u64) -> Self {
        Semaphore {
            count: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    pub fn acquire(&self, n: u64) {
        let mut count = self.count.lock();
        while *count < n {
            self.cv.wait(&mut count);
        }
        *count -= n;
    }

    pub fn try_acquire(&self, n: u64) -> bool {
        let mut count = self.count.lock();
        if *count >= n {
            *count -= n;
            true
        } else {
            false
        }
    }

    pub fn try_acquire_timed(&self, n: u64, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        let deadline = std::time::Instant::now() + timeout;
        while *count < n {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self.cv.wait_for(&mut count, deadline - now);
            if result.timed_out() && *count < n {
                return false;
            }
        }
        *count -= n;
        true
    }

    pub fn release(&self, n: u64) {
        let mut count = self.count.lock();
        *count += n;
        // Every release wakes everyone; wake-ups are not coalesced
        // (spec.md §5).
        self.cv.notify_all();
    }

    pub fn available(&self) -> u64 {
        *self.count.lock()
    }
}
