//! Virtual tasks and scheduling (spec.md §4.7). A `VTask` is a unit of
//! cooperative work dispatched by a worker's event loop; nested run
//! queues let a task group present itself as a single schedulable child.
//! Struct layout follows the original's `vtask` (link/vtask_flags/cancel/
//! priority/vtime/seqid), reshaped into owned fields instead of an
//! intrusive link since Rust ownership already gives us move-in/move-out
//! queue membership.

pub mod group;
pub mod runqueue;

use runqueue::RunQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// What a task's function returned, i.e. where it suspended (spec.md
/// §4.8's suspension points, minus `CONTINUATION_FUNC` which is modelled
/// by calling `VTask::set_func` before returning `Continuation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    Completed,
    Aborted,
    Continuation,
    Yield,
}

pub type TaskFn = Box<dyn FnMut() -> Suspend + Send>;

/// A vtask is either a leaf function or a nested run-queue presenting
/// itself as one schedulable child (spec.md §3 "Run queues", §4.7's
/// `exec` pseudocode: `if vtask.type == RQ: vtask = rq_fetch(vtask)`).
enum VTaskKind {
    Task(TaskFn),
    Rq(Box<dyn RunQueue>),
}

/// Monotonic seqid allocator; seqids are never reused within a process
/// lifetime (spec.md §5).
pub struct SeqAllocator(AtomicU64);

impl SeqAllocator {
    pub fn new() -> Self {
        SeqAllocator(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SeqAllocator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct VTask {
    pub seqid: u64,
    /// Nice-value convention: a smaller number is higher priority, used
    /// by the fair run-queue's `vtime += priority` accrual (spec.md
    /// §4.7).
    pub priority: u32,
    pub vtime: u64,
    cancel: AtomicBool,
    kind: VTaskKind,
}

impl VTask {
    pub fn new(seqid: u64, priority: u32, func: TaskFn) -> Self {
        VTask {
            seqid,
            priority,
            vtime: 0,
            cancel: AtomicBool::new(false),
            kind: VTaskKind::Task(func),
        }
    }

    /// Wraps `rq` as a single schedulable child of whatever queue this
    /// task is pushed onto; the parent's `fetch_descend` recurses into it
    /// instead of dispatching it directly (spec.md §3, §4.7).
    pub fn from_rq(seqid: u64, priority: u32, rq: Box<dyn RunQueue>) -> Self {
        VTask {
            seqid,
            priority,
            vtime: 0,
            cancel: AtomicBool::new(false),
            kind: VTaskKind::Rq(rq),
        }
    }

    /// Exposes the nested run-queue for a task built with `from_rq`, used
    /// by `RunQueue::fetch_descend` to recurse.
    pub fn as_rq_mut(&mut self) -> Option<&mut Box<dyn RunQueue>> {
        match &mut self.kind {
            VTaskKind::Rq(rq) => Some(rq),
            VTaskKind::Task(_) => None,
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn set_func(&mut self, func: TaskFn) {
        self.kind = VTaskKind::Task(func);
    }

    /// Dispatches the task's function unless it was cancelled, in which
    /// case it takes the autoclean path without invoking the user
    /// function (spec.md §4.7). An RQ-kind task should always be
    /// descended into via `RunQueue::fetch_descend` before it reaches
    /// here; if one slips through, yield rather than drop it.
    pub fn dispatch(&mut self) -> Suspend {
        self.vtime += 1;
        if self.is_cancelled() {
            return Suspend::Aborted;
        }
        match &mut self.kind {
            VTaskKind::Task(f) => f(),
            VTaskKind::Rq(_) => Suspend::Yield,
        }
    }
}

impl std::fmt::Debug for VTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VTask")
            .field("seqid", &self.seqid)
            .field("priority", &self.priority)
            .field("vtime", &self.vtime)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_task_skips_user_function() {
        let mut task = VTask::new(1, 0, Box::new(|| Suspend::Completed));
        task.cancel();
        assert_eq!(task.dispatch(), Suspend::Aborted);
    }

    #[test]
    fn seqids_are_monotonic() {
        let alloc = SeqAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert!(b > a);
    }
}
