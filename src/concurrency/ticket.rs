//! Ticket lock (spec.md §4.6): two 16-bit counters packed into one
//! 32-bit word so acquire/release is a single atomic fetch-add plus a
//! spin-wait, fair FIFO among contenders. Grounded on the teacher's
//! ticket-based sequencer protocol (`SequencerConsumer`), generalized
//! from a one-shot ordering check into a reusable mutual-exclusion lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct TicketLock {
    // low 16 bits: now_serving, high 16 bits: next_ticket
    state: AtomicU32,
}

impl TicketLock {
    pub fn new() -> Self {
        TicketLock { state: AtomicU32::new(0) }
    }

    /// Spins until this caller's ticket is being served, then returns a
    /// guard that releases on drop.
    pub fn lock(&self) -> TicketGuard<'_> {
        let my_ticket = (self.state.fetch_add(1 << 16, Ordering::AcqRel) >> 16) as u16;
        loop {
            let now_serving = (self.state.load(Ordering::Acquire) & 0xFFFF) as u16;
            if now_serving == my_ticket {
                break;
            }
            std::hint::spin_loop();
        }
        TicketGuard { lock: self }
    }

    fn release(&self) {
        self.state.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for TicketLock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TicketGuard<'a> {
    lock: &'a TicketLock,
}

impl<'a> Drop for TicketGuard<'a> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Keyed ticket locks, one per `hash(oid)` stripe, as spec.md §4.5's
/// cache concurrency section calls for.
pub struct StripedTicketLocks {
    stripes: Vec<Arc<TicketLock>>,
}

impl StripedTicketLocks {
    pub fn new(nstripes: usize) -> Self {
        StripedTicketLocks {
            stripes: (0..nstripes.max(1)).map(|_| Arc::new(TicketLock::new())).collect(),
        }
    }

    pub fn for_key(&self, hash: u64) -> &TicketLock {
        &self.stripes[(hash % self.stripes.len() as u64) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn mutual_exclusion_under_contention() {
        let lock = Arc::new(TicketLock::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _g = lock.lock();
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn single_threaded_lock_unlock() {
        let lock = TicketLock::new();
        {
            let _g = lock.lock();
        }
        let _g2 = lock.lock();
    }
}
