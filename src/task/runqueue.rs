//! Run-queue policies (spec.md §4.7): FIFO, round-robin, and fair.

use super::VTask;
use std::collections::VecDeque;

pub trait RunQueue: Send {
    fn push(&mut self, task: VTask);
    /// Removes and returns the next task to dispatch.
    fn fetch(&mut self) -> Option<VTask>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches the next truly-dispatchable task, descending through any
    /// nested run-queue a `VTask` wraps (spec.md §4.7's `exec`
    /// pseudocode: `if vtask.type == RQ: vtask = rq_fetch(vtask)`). A
    /// nested queue that drains to empty is dropped and the search
    /// continues instead of being re-pushed.
    fn fetch_descend(&mut self) -> Option<VTask> {
        loop {
            let mut task = self.fetch()?;
            match task.as_rq_mut() {
                Some(rq) => {
                    let child = rq.fetch_descend();
                    let exhausted = rq.is_empty();
                    match child {
                        Some(child) => {
                            if !exhausted {
                                self.push(task);
                            }
                            return Some(child);
                        }
                        None => continue,
                    }
                }
                None => return Some(task),
            }
        }
    }
}

/// Plain FIFO queue; a `Yield`ed task goes back on the tail.
pub struct FifoRunQueue {
    deque: VecDeque<VTask>,
}

impl FifoRunQueue {
    pub fn new() -> Self {
        FifoRunQueue { deque: VecDeque::new() }
    }
}

impl Default for FifoRunQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RunQueue for FifoRunQueue {
    fn push(&mut self, task: VTask) {
        self.deque.push_back(task);
    }

    fn fetch(&mut self) -> Option<VTask> {
        self.deque.pop_front()
    }

    fn len(&self) -> usize {
        self.deque.len()
    }
}

/// Quantum computation for a child with priority `p` in a run-queue whose
/// priority sum is `priority_sum`, normalised against `parent_quantum`
/// (spec.md §4.7). Shift amounts are clamped to avoid overflow panics on
/// pathological config values; the formula itself is quoted verbatim.
pub fn compute_quantum(priority: u64, priority_sum: u64, parent_quantum: u64, fairness_shift: u32) -> u64 {
    if priority_sum == 0 {
        return parent_quantum.max(1);
    }
    let shift = fairness_shift.min(63);
    let scaled = (priority << shift) / priority_sum;
    let boost_shift = parent_quantum.min(63) as u32;
    1 + ((scaled << boost_shift) >> shift)
}

/// Round-robin: each child gets a quantum derived from its priority
/// share; quantum expiry rotates the task to the tail (spec.md §4.7).
/// Plain `push`/`fetch` behave like FIFO for a single dispatch; a task
/// that returns `Suspend::Yield` should go back through [`requeue`]
/// rather than `push` so its quantum is tracked across re-dispatches.
pub struct RoundRobinRunQueue {
    deque: VecDeque<VTask>,
    remaining: std::collections::HashMap<u64, u64>,
    parent_quantum: u64,
    fairness_shift: u32,
}

impl RoundRobinRunQueue {
    pub fn new(parent_quantum: u64, fairness_shift: u32) -> Self {
        RoundRobinRunQueue {
            deque: VecDeque::new(),
            remaining: std::collections::HashMap::new(),
            parent_quantum,
            fairness_shift,
        }
    }

    fn priority_sum(&self) -> u64 {
        self.deque.iter().map(|t| t.priority as u64).sum()
    }

    fn fresh_quantum(&self, priority: u32) -> u64 {
        let sum = self.priority_sum() + priority as u64;
        compute_quantum(priority as u64, sum.max(1), self.parent_quantum, self.fairness_shift)
    }

    /// Re-enqueues a task that returned `Suspend::Yield`: stays at the
    /// head (quantum still has budget) or rotates to the tail with a
    /// fresh quantum once its budget is exhausted.
    pub fn requeue(&mut self, task: VTask) {
        let fresh = self.fresh_quantum(task.priority);
        let left = self.remaining.entry(task.seqid).or_insert(fresh);
        *left = left.saturating_sub(1);
        if *left > 0 {
            self.deque.push_front(task);
        } else {
            self.remaining.remove(&task.seqid);
            self.deque.push_back(task);
        }
    }
}

impl RunQueue for RoundRobinRunQueue {
    fn push(&mut self, task: VTask) {
        self.deque.push_back(task);
    }

    fn fetch(&mut self) -> Option<VTask> {
        let task = self.deque.pop_front()?;
        let fresh = self.fresh_quantum(task.priority);
        self.remaining.entry(task.seqid).or_insert(fresh);
        Some(task)
    }

    fn len(&self) -> usize {
        self.deque.len()
    }
}

/// A min-vtime priority queue. On every dispatch `vtime += priority`
/// (nice-value convention — smaller `priority` grows vtime more slowly,
/// so it is picked more often) (spec.md §4.7).
pub struct FairRunQueue {
    tasks: Vec<VTask>,
}

impl FairRunQueue {
    pub fn new() -> Self {
        FairRunQueue { tasks: Vec::new() }
    }
}

impl Default for FairRunQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RunQueue for FairRunQueue {
    fn push(&mut self, task: VTask) {
        self.tasks.push(task);
    }

    fn fetch(&mut self) -> Option<VTask> {
        if self.tasks.is_empty() {
            return None;
        }
        let mut min_idx = 0;
        for i in 1..self.tasks.len() {
            if self.tasks[i].vtime < self.tasks[min_idx].vtime {
                min_idx = i;
            }
        }
        let mut task = self.tasks.remove(min_idx);
        task.vtime += task.priority as u64;
        Some(task)
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Suspend;

    fn noop(seqid: u64, priority: u32) -> VTask {
        VTask::new(seqid, priority, Box::new(|| Suspend::Completed))
    }

    #[test]
    fn fifo_preserves_order() {
        let mut rq = FifoRunQueue::new();
        rq.push(noop(1, 0));
        rq.push(noop(2, 0));
        assert_eq!(rq.fetch().unwrap().seqid, 1);
        assert_eq!(rq.fetch().unwrap().seqid, 2);
        assert!(rq.fetch().is_none());
    }

    #[test]
    fn quantum_formula_monotonic_in_priority() {
        let low = compute_quantum(1, 10, 4, 4);
        let high = compute_quantum(9, 10, 4, 4);
        assert!(high >= low);
    }

    #[test]
    fn quantum_never_zero() {
        assert!(compute_quantum(0, 10, 4, 4) >= 1);
        assert!(compute_quantum(5, 0, 4, 4) >= 1);
    }

    #[test]
    fn fair_picks_lowest_vtime_first() {
        let mut rq = FairRunQueue::new();
        rq.push(noop(1, 5)); // low priority number == higher importance
        rq.push(noop(2, 100));
        let first = rq.fetch().unwrap();
        assert_eq!(first.seqid, 1);
    }

    #[test]
    fn fair_low_priority_number_picked_more_often() {
        let mut rq = FairRunQueue::new();
        rq.push(noop(1, 1));
        rq.push(noop(2, 10));
        let mut picks = [0u32; 2];
        for _ in 0..6 {
            let t = rq.fetch().unwrap();
            picks[(t.seqid - 1) as usize] += 1;
            rq.push(t);
        }
        assert!(picks[0] > picks[1]);
    }
}
