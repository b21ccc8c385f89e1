//! Read/Write/Commit semaphore (spec.md §4.6): three operation modes
//! share one object's access gate. State fits in a single atomic word;
//! `try_acquire` is a CAS loop, blocking `acquire` parks on a condvar
//! until a release wakes it — the "park on the object's waiter queue"
//! behavior spec.md §4.8 describes for a dispatch that cannot acquire.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    Commit,
}

const WRITER_BIT: u64 = 1 << 32;
const COMMIT_BIT: u64 = 1 << 33;
const READER_MASK: u64 = (1 << 32) - 1;

fn readers(state: u64) -> u64 {
    state & READER_MASK
}

/// `RwCSem` grants one of three coexistence classes per spec.md §4.6:
/// readers coexist with writers but block commits; writers block other
/// writers and commits but not new readers; commit is fully exclusive.
type ReadyCallback = Box<dyn FnOnce() + Send>;

pub struct RwCSem {
    state: AtomicU64,
    waiters: Mutex<()>,
    cv: Condvar,
    parked: Mutex<VecDeque<(Mode, ReadyCallback)>>,
}

impl RwCSem {
    pub fn new() -> Self {
        RwCSem {
            state: AtomicU64::new(0),
            waiters: Mutex::new(()),
            cv: Condvar::new(),
            parked: Mutex::new(VecDeque::new()),
        }
    }

    fn can_acquire(state: u64, mode: Mode) -> bool {
        match mode {
            Mode::Read => state & COMMIT_BIT == 0,
            Mode::Write => state & (WRITER_BIT | COMMIT_BIT) == 0 && readers(state) == 0,
            Mode::Commit => state == 0,
        }
    }

    pub fn try_acquire(&self, mode: Mode) -> bool {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if !Self::can_acquire(cur, mode) {
                return false;
            }
            let next = match mode {
                Mode::Read => cur + 1,
                Mode::Write => cur | WRITER_BIT,
                Mode::Commit => cur | COMMIT_BIT,
            };
            if self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Blocks until `mode` can be acquired.
    pub fn acquire(&self, mode: Mode) {
        loop {
            if self.try_acquire(mode) {
                return;
            }
            let mut guard = self.waiters.lock();
            if self.try_acquire(mode) {
                return;
            }
            self.cv.wait(&mut guard);
        }
    }

    /// Parks a callback to run once `mode` looks acquirable, without
    /// blocking the calling thread — the suspension path for a dispatch
    /// that cannot take the rwcsem immediately (spec.md §4.8, §5
    /// suspension point (b)). The callback is responsible for calling
    /// `try_acquire` itself and re-parking if it loses a race against
    /// another waiter.
    pub fn park(&self, mode: Mode, on_ready: ReadyCallback) {
        self.parked.lock().push_back((mode, on_ready));
    }

    pub fn release(&self, mode: Mode) {
        match mode {
            Mode::Read => {
                self.state.fetch_sub(1, Ordering::AcqRel);
            }
            Mode::Write => {
                self.state.fetch_and(!WRITER_BIT, Ordering::AcqRel);
            }
            Mode::Commit => {
                self.state.fetch_and(!COMMIT_BIT, Ordering::AcqRel);
            }
        }
        {
            let _guard = self.waiters.lock();
            self.cv.notify_all();
        }
        self.drain_ready_waiters();
    }

    /// Wakes parked callbacks in FIFO order as long as their mode could be
    /// acquired right now, stopping at the first one that still can't
    /// (preserves queueing order rather than letting a later, compatible
    /// waiter cut ahead of an earlier, blocked one). This only peeks at
    /// the state, it does not acquire on the waiter's behalf: the woken
    /// callback is expected to retry its own `try_acquire`, since by the
    /// time its task actually runs another waiter may have raced in.
    fn drain_ready_waiters(&self) {
        loop {
            let ready = {
                let mut parked = self.parked.lock();
                let cur = self.state.load(Ordering::Acquire);
                let front_ok = parked.front().map(|(mode, _)| Self::can_acquire(cur, *mode)).unwrap_or(false);
                if front_ok {
                    parked.pop_front()
                } else {
                    None
                }
            };
            match ready {
                Some((_, on_ready)) => on_ready(),
                None => break,
            }
        }
    }
}

impl Default for RwCSem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn readers_coexist() {
        let sem = RwCSem::new();
        assert!(sem.try_acquire(Mode::Read));
        assert!(sem.try_acquire(Mode::Read));
        sem.release(Mode::Read);
        sem.release(Mode::Read);
    }

    #[test]
    fn reader_blocks_commit() {
        let sem = RwCSem::new();
        assert!(sem.try_acquire(Mode::Read));
        assert!(!sem.try_acquire(Mode::Commit));
        sem.release(Mode::Read);
        assert!(sem.try_acquire(Mode::Commit));
    }

    #[test]
    fn writer_blocks_other_writers_and_commit_but_not_readers() {
        let sem = RwCSem::new();
        assert!(sem.try_acquire(Mode::Write));
        assert!(!sem.try_acquire(Mode::Write));
        assert!(!sem.try_acquire(Mode::Commit));
        assert!(sem.try_acquire(Mode::Read));
        sem.release(Mode::Write);
        sem.release(Mode::Read);
    }

    #[test]
    fn reader_blocks_new_writer() {
        let sem = RwCSem::new();
        assert!(sem.try_acquire(Mode::Read));
        assert!(!sem.try_acquire(Mode::Write));
        sem.release(Mode::Read);
        assert!(sem.try_acquire(Mode::Write));
    }

    #[test]
    fn blocking_acquire_wakes_on_release() {
        let sem = Arc::new(RwCSem::new());
        sem.acquire(Mode::Commit);
        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            sem2.acquire(Mode::Read);
            sem2.release(Mode::Read);
        });
        thread::sleep(std::time::Duration::from_millis(20));
        sem.release(Mode::Commit);
        handle.join().unwrap();
    }
}
