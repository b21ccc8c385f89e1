//! Cross-worker SPSC ring dispatch (spec.md §5): each cooperative worker
//! owns one single-producer/single-consumer ring per peer worker, and
//! `vtask`s destined for another worker's run-queue cross through it.
//!
//! Grounded on the ticket-based ring protocol in the teacher's sequencer
//! consumer: a monotonic ticket is attached to every slot so the consumer
//! can assert strict in-order delivery the same way `OrderingValidator`
//! does, even though the transport here is `crossbeam_queue::ArrayQueue`
//! rather than a raw mmap'd ring.

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks the next expected ticket and flags any gap or reorder, mirroring
/// the teacher's `OrderingValidator`.
#[derive(Default)]
pub struct OrderingValidator {
    last_ticket: Option<u64>,
    violations: u64,
}

impl OrderingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ticket: u64) -> bool {
        let ok = match self.last_ticket {
            Some(last) => ticket == last + 1,
            None => true,
        };
        if !ok {
            self.violations += 1;
        }
        self.last_ticket = Some(ticket);
        ok
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }
}

struct Slot<T> {
    ticket: u64,
    item: T,
}

/// A bounded single-producer/single-consumer ring. The producer side
/// reserves a ticket with a single fetch-add, so concurrent producers
/// across workers (spec.md's "cross-worker" dispatch) never collide on
/// sequence numbers even though only one consumer drains the ring.
pub struct Ring<T> {
    queue: ArrayQueue<Slot<T>>,
    next_ticket: AtomicU64,
}

pub struct RingStats {
    pub delivered: u64,
    pub violations: u64,
}

impl<T> Ring<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Ring {
            queue: ArrayQueue::new(capacity.max(1)),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Reserves the next ticket and pushes `item`. Returns the item back
    /// on overflow (spec.md: a full remote ring is backpressure, not data
    /// loss — the caller retries or falls back to local execution).
    pub fn push(&self, item: T) -> Result<u64, T> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        match self.queue.push(Slot { ticket, item }) {
            Ok(()) => Ok(ticket),
            Err(Slot { item, .. }) => Err(item),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Pops the next item without ordering validation, for callers (the
    /// event loop's own drain site) that already know they are the ring's
    /// sole consumer and don't need [`Consumer`]'s bookkeeping.
    pub fn pop(&self) -> Option<T> {
        self.queue.pop().map(|slot| slot.item)
    }
}

/// Single-consumer drain side, owning the ordering validator so only one
/// thread ever calls `pop`.
pub struct Consumer<'a, T> {
    ring: &'a Ring<T>,
    validator: OrderingValidator,
    delivered: u64,
}

impl<'a, T> Consumer<'a, T> {
    pub fn new(ring: &'a Ring<T>) -> Self {
        Consumer {
            ring,
            validator: OrderingValidator::new(),
            delivered: 0,
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let slot = self.ring.queue.pop()?;
        self.validator.check(slot.ticket);
        self.delivered += 1;
        Some(slot.item)
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            delivered: self.delivered,
            violations: self.validator.violations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_delivery_in_order() {
        let ring = Ring::with_capacity(8);
        for i in 0..8 {
            ring.push(i).unwrap();
        }
        let mut consumer = Consumer::new(&ring);
        for i in 0..8 {
            assert_eq!(consumer.pop(), Some(i));
        }
        assert_eq!(consumer.pop(), None);
        assert_eq!(consumer.stats().violations, 0);
        assert_eq!(consumer.stats().delivered, 8);
    }

    #[test]
    fn push_fails_when_full() {
        let ring: Ring<i32> = Ring::with_capacity(2);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.push(3), Err(3));
    }

    #[test]
    fn tickets_are_monotonic_across_producers() {
        let ring = Ring::with_capacity(16);
        for i in 0..16 {
            let ticket = ring.push(i).unwrap();
            assert_eq!(ticket, i as u64);
        }
    }
}
