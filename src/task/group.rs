//! Task groups and barriers (spec.md §4.7): a group wraps a run-queue and
//! lets callers append a barrier task that fences everything appended
//! after it until everything before it has drained.

use super::runqueue::RunQueue;
use super::VTask;

struct Entry {
    task: VTask,
    is_barrier: bool,
}

/// Wraps any [`RunQueue`] policy and adds barrier semantics: `fetch`
/// returns only tasks added before the oldest outstanding barrier until
/// that barrier itself has been fetched and reported complete via
/// [`TaskGroup::barrier_completed`].
pub struct TaskGroup<Q: RunQueue> {
    rq: Q,
    order: std::collections::VecDeque<Entry>,
    blocked_on_barrier: bool,
}

impl<Q: RunQueue> TaskGroup<Q> {
    pub fn new(rq: Q) -> Self {
        TaskGroup {
            rq,
            order: std::collections::VecDeque::new(),
            blocked_on_barrier: false,
        }
    }

    pub fn push(&mut self, task: VTask) {
        self.order.push_back(Entry { is_barrier: false, task: Self::placeholder(&task) });
        self.rq.push(task);
    }

    /// Appends a barrier: nothing queued after it is released by `fetch`
    /// until this barrier completes.
    pub fn push_barrier(&mut self, task: VTask) {
        self.order.push_back(Entry { is_barrier: true, task: Self::placeholder(&task) });
        self.rq.push(task);
    }

    fn placeholder(task: &VTask) -> VTask {
        // A zero-cost stand-in carrying only the bookkeeping fields this
        // module needs (seqid); it is never dispatched.
        VTask::new(task.seqid, task.priority, Box::new(|| super::Suspend::Completed))
    }

    /// Returns the next dispatchable task, honoring the barrier fence.
    pub fn fetch(&mut self) -> Option<VTask> {
        if self.blocked_on_barrier {
            return None;
        }
        let front_is_barrier = self.order.front().map(|e| e.is_barrier).unwrap_or(false);
        let task = self.rq.fetch()?;
        self.order.pop_front();
        if front_is_barrier {
            self.blocked_on_barrier = true;
        }
        Some(task)
    }

    /// Call once a barrier task fetched via `fetch` has finished
    /// executing, releasing tasks queued after it.
    pub fn barrier_completed(&mut self) {
        self.blocked_on_barrier = false;
    }

    pub fn len(&self) -> usize {
        self.rq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rq.is_empty()
    }
}

/// A `TaskGroup` is itself a `RunQueue`, so it can be wrapped in a
/// `VTask::from_rq` and scheduled as one nested child of another queue
/// (spec.md §3's "Run queues" present a group as a single schedulable
/// child to its parent).
impl<Q: RunQueue> RunQueue for TaskGroup<Q> {
    fn push(&mut self, task: VTask) {
        TaskGroup::push(self, task);
    }

    fn fetch(&mut self) -> Option<VTask> {
        TaskGroup::fetch(self)
    }

    fn len(&self) -> usize {
        TaskGroup::len(self)
    }

    fn is_empty(&self) -> bool {
        TaskGroup::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::runqueue::FifoRunQueue;
    use crate::task::Suspend;

    fn noop(seqid: u64) -> VTask {
        VTask::new(seqid, 0, Box::new(|| Suspend::Completed))
    }

    #[test]
    fn barrier_fences_later_tasks() {
        let mut group = TaskGroup::new(FifoRunQueue::new());
        group.push(noop(1));
        group.push_barrier(noop(2));
        group.push(noop(3));

        assert_eq!(group.fetch().unwrap().seqid, 1);
        let barrier = group.fetch().unwrap();
        assert_eq!(barrier.seqid, 2);
        // Task 3 is fenced until the barrier reports completion.
        assert!(group.fetch().is_none());
        group.barrier_completed();
        assert_eq!(group.fetch().unwrap().seqid, 3);
    }

    #[test]
    fn no_barrier_drains_normally() {
        let mut group = TaskGroup::new(FifoRunQueue::new());
        group.push(noop(1));
        group.push(noop(2));
        assert_eq!(group.fetch().unwrap().seqid, 1);
        assert_eq!(group.fetch().unwrap().seqid, 2);
        assert!(group.is_empty());
    }
}
