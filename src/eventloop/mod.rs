//! Event loop, iopoll engine, and cross-worker dispatch (spec.md §4.8).
//!
//! One [`Worker`] per core: it owns an [`iopoll::IoPoll`] engine, a local
//! run-queue, one inbound [`Ring`](crate::intrusive::spsc::Ring) per peer
//! worker for cross-core task posting, and a latency [`Histogram`]. A
//! [`Runtime`] owns the worker threads and drives the open/stop/close
//! lifecycle spec.md assigns to `context_{open,stop,close}`.

pub mod iopoll;

use crate::intrusive::spsc::Ring;
use crate::primitives::histogram::Histogram;
use crate::task::runqueue::{FifoRunQueue, RunQueue};
use crate::task::{Suspend, VTask};
use iopoll::{EntityCallbacks, EntityId, IoPoll, Readiness};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// The worker's own "someone posted cross-core work" entity: registered
/// once at worker start, fired by [`WorkerHandle::post_from`] on every
/// successful cross-core post (spec.md §4.8: "the target is woken via its
/// `uevent` entity").
struct WakeEntity(Arc<AtomicU64>);

impl EntityCallbacks for WakeEntity {
    fn uevent(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pins the calling thread to `cpu_id`. Best-effort: failures are logged,
/// never fatal, since affinity is a scheduling hint and the core still
/// runs correctly unpinned.
#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
fn pin_to_cpu(cpu_id: usize) {
    unsafe {
        let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(cpu_id, &mut cpu_set);
        let result = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpu_set,
        );
        if result != 0 {
            log::warn!("failed to pin worker to cpu {cpu_id}: errno {result}");
        }
    }
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
fn pin_to_cpu(_cpu_id: usize) {}

/// Per-core state shared between the worker's own thread and whoever
/// posts tasks to it from another core.
struct Shared {
    inbound: Vec<Ring<VTask>>,
    local: Mutex<Box<dyn RunQueue>>,
    stop: AtomicBool,
    histogram: Mutex<Histogram>,
    iopoll: Mutex<IoPoll>,
    wake_entity: EntityId,
    wake_count: Arc<AtomicU64>,
}

/// A single worker core (spec.md §4.8). `exec` is its entry point, run on
/// a dedicated OS thread by [`Runtime::open`].
pub struct Worker {
    id: usize,
    shared: Arc<Shared>,
}

impl Worker {
    fn new(id: usize, ncores: usize, ring_size: usize) -> Self {
        let mut inbound = Vec::with_capacity(ncores);
        for _ in 0..ncores {
            inbound.push(Ring::with_capacity(ring_size));
        }
        let wake_count = Arc::new(AtomicU64::new(0));
        let mut iopoll = IoPoll::new();
        let wake_entity = iopoll.register(Box::new(WakeEntity(wake_count.clone())));
        Worker {
            id,
            shared: Arc::new(Shared {
                inbound,
                local: Mutex::new(Box::new(FifoRunQueue::new())),
                stop: AtomicBool::new(false),
                histogram: Mutex::new(Histogram::new()),
                iopoll: Mutex::new(iopoll),
                wake_entity,
                wake_count,
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shared: self.shared.clone(),
        }
    }

    /// `exec`: drain inbound rings into the local RQ, then pump the local
    /// RQ until empty, recording dispatch latency as it goes. Runs until
    /// `stop` is set.
    fn exec(self) {
        pin_to_cpu(self.id);
        log::info!("worker {} starting", self.id);
        while !self.shared.stop.load(Ordering::Relaxed) {
            let mut drained = false;
            for ring in &self.shared.inbound {
                while let Some(task) = drain_one(ring) {
                    self.shared.local.lock().push(task);
                    drained = true;
                }
            }
            let task = self.shared.local.lock().fetch_descend();
            match task {
                Some(mut task) => {
                    let start = Instant::now();
                    let suspend = task.dispatch();
                    let elapsed = start.elapsed().as_nanos() as u64;
                    self.shared.histogram.lock().record(elapsed);
                    if suspend == Suspend::Yield {
                        self.shared.local.lock().push(task);
                    }
                }
                None if !drained => {
                    std::thread::yield_now();
                }
                None => {}
            }
        }
        log::info!("worker {} stopped", self.id);
    }
}

fn drain_one(ring: &Ring<VTask>) -> Option<VTask> {
    // A dedicated `Consumer` is unnecessary here: each ring has exactly
    // one drain site (this worker's own `exec` loop), so ordering
    // validation would just restate `push`'s fetch-add ticket order.
    ring.pop()
}

/// A handle cheap to clone and hand to other workers or the runtime for
/// posting tasks onto this worker's local queue.
#[derive(Clone)]
pub struct WorkerHandle {
    shared: Arc<Shared>,
}

impl WorkerHandle {
    /// Posts `task` through the SPSC ring from `from_core`. Returns the
    /// task back on a full ring (backpressure, not data loss, per
    /// spec.md §5).
    fn post_from(&self, from_core: usize, task: VTask) -> Result<(), VTask> {
        self.shared.inbound[from_core].push(task).map(|_ticket| ())?;
        self.shared.iopoll.lock().fire(self.shared.wake_entity, Readiness::UserEvent);
        Ok(())
    }

    /// Posts `task` back onto this same worker's queue, used to resume a
    /// dispatch that parked waiting on an object's rwcsem (spec.md §4.8
    /// suspension point (b)).
    pub fn post(&self, from_core: usize, task: VTask) -> Result<(), VTask> {
        self.post_from(from_core, task)
    }

    pub fn histogram_mean_ns(&self) -> f64 {
        self.shared.histogram.lock().mean_ns()
    }

    pub fn local_len(&self) -> usize {
        self.shared.local.lock().len()
    }

    pub fn wake_count(&self) -> u64 {
        self.shared.wake_count.load(Ordering::Relaxed)
    }
}

/// Owns the worker threads and the lifecycle spec.md assigns to
/// `context_open`/`context_stop`/`context_close`.
pub struct Runtime {
    handles: Vec<WorkerHandle>,
    threads: Vec<JoinHandle<()>>,
    next_target: AtomicUsize,
}

impl Runtime {
    /// `context_open(conf)`: spawns `ncores` workers, pins each to its CPU,
    /// and wires up the per-(posting-core, target-core) SPSC rings.
    pub fn open(ncores: usize, ring_size: usize) -> Self {
        let ncores = ncores.max(1);
        let workers: Vec<Worker> = (0..ncores).map(|id| Worker::new(id, ncores, ring_size)).collect();
        let handles: Vec<WorkerHandle> = workers.iter().map(Worker::handle).collect();
        let threads = workers
            .into_iter()
            .map(|w| std::thread::spawn(move || w.exec()))
            .collect();
        Runtime {
            handles,
            threads,
            next_target: AtomicUsize::new(0),
        }
    }

    pub fn ncores(&self) -> usize {
        self.handles.len()
    }

    /// Returns a clone of `core`'s handle, for callers that need to post
    /// follow-up tasks to the same worker later (e.g. a parked object
    /// dispatch resuming from `RwCSem::release`).
    pub fn handle(&self, core: usize) -> WorkerHandle {
        self.handles[core].clone()
    }

    /// `add_task_to(core)`: posts `task` onto `core`'s local RQ through
    /// the SPSC ring from `from_core`.
    pub fn add_task_to(&self, from_core: usize, core: usize, task: VTask) -> Result<(), VTask> {
        self.handles[core].post_from(from_core, task)
    }

    /// Posts `group` as a single nested run-queue onto `core`'s local RQ
    /// (spec.md §3's "Run queues" present a group as one schedulable
    /// child to its parent).
    pub fn add_group_to(
        &self,
        from_core: usize,
        core: usize,
        seqid: u64,
        priority: u32,
        group: Box<dyn RunQueue>,
    ) -> Result<(), VTask> {
        let task = VTask::from_rq(seqid, priority, group);
        self.add_task_to(from_core, core, task)
    }

    /// `add_task` with no target core: round-robins over live workers.
    pub fn add_task(&self, from_core: usize, task: VTask) -> Result<(), VTask> {
        let target = self.next_target.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        self.add_task_to(from_core, target, task)
    }

    /// `context_stop`: sets the stop flag each worker polls; does not
    /// block.
    pub fn stop(&self) {
        for handle in &self.handles {
            handle.shared.stop.store(true, Ordering::Relaxed);
        }
    }

    /// `context_close`: joins all worker threads. Callers should `stop()`
    /// first or this blocks until the workers drain on their own.
    pub fn close(self) {
        for t in self.threads {
            let _ = t.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn task_posted_to_worker_runs() {
        let rt = Runtime::open(2, 16);
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let task = VTask::new(
            1,
            0,
            Box::new(move || {
                ran2.store(true, Ordering::Relaxed);
                Suspend::Completed
            }),
        );
        rt.add_task_to(0, 1, task).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        rt.stop();
        rt.close();
        assert!(ran.load(Ordering::Relaxed));
    }

    #[test]
    fn round_robin_spreads_across_cores() {
        let rt = Runtime::open(3, 64);
        let hits = Arc::new(AtomicU32::new(0));
        for _ in 0..9 {
            let hits2 = hits.clone();
            let task = VTask::new(
                0,
                0,
                Box::new(move || {
                    hits2.fetch_add(1, Ordering::Relaxed);
                    Suspend::Completed
                }),
            );
            rt.add_task(0, task).unwrap();
        }
        std::thread::sleep(Duration::from_millis(100));
        rt.stop();
        rt.close();
        assert_eq!(hits.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn posting_cross_core_fires_wake_entity() {
        let rt = Runtime::open(2, 16);
        let task = VTask::new(1, 0, Box::new(|| Suspend::Completed));
        rt.add_task_to(0, 1, task).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let woken = rt.handles[1].wake_count();
        rt.stop();
        rt.close();
        assert_eq!(woken, 1);
    }

    #[test]
    fn nested_task_group_descends_and_runs_both_children() {
        use crate::task::group::TaskGroup;

        let rt = Runtime::open(1, 16);
        let ran = Arc::new(AtomicU32::new(0));

        let mut group = TaskGroup::new(FifoRunQueue::new());
        for seqid in [10u64, 11] {
            let ran2 = ran.clone();
            group.push(VTask::new(
                seqid,
                0,
                Box::new(move || {
                    ran2.fetch_add(1, Ordering::Relaxed);
                    Suspend::Completed
                }),
            ));
        }
        rt.add_group_to(0, 0, 1, 0, Box::new(group)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        rt.stop();
        rt.close();
        assert_eq!(ran.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn histogram_records_dispatch_latency() {
        let rt = Runtime::open(1, 16);
        let task = VTask::new(1, 0, Box::new(|| Suspend::Completed));
        rt.add_task_to(0, 0, task).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let mean = rt.handles[0].histogram_mean_ns();
        rt.stop();
        rt.close();
        assert!(mean > 0.0);
    }
}
