//! Host task-system bridge
//!
//! The engine never spawns threads. Each parallel phase becomes one range task
//! handed to the host's [`TaskSystem`]; the driving thread then blocks on
//! `finish` before any later phase reads the results. A host that returns no
//! handle asks for the task to run inline, which gives the same end state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use planar_structures::BitSet;

/// Range-task body: process items `start..end` on worker `thread_index`
pub trait TaskCallback: Sync {
    fn execute(&self, start: usize, end: usize, thread_index: usize);
}

impl<F> TaskCallback for F
where
    F: Fn(usize, usize, usize) + Sync,
{
    fn execute(&self, start: usize, end: usize, thread_index: usize) {
        self(start, end, thread_index)
    }
}

/// Opaque handle for an enqueued task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

/// Host thread pool interface.
///
/// `enqueue` must cover every item in `0..item_count` exactly once, with ranges of at
/// least `min_range` items where possible, and pass a thread index in
/// `0..worker_count()`. The task reference is only valid until `finish` returns for
/// the handle, so hosts finish the work by then.
pub trait TaskSystem: Send + Sync {
    /// Number of threads that may run ranges concurrently
    fn worker_count(&self) -> usize;

    /// Start a parallel-for. `None` means the engine should run the task itself.
    fn enqueue(&self, task: &dyn TaskCallback, item_count: usize, min_range: usize) -> Option<TaskHandle>;

    /// Block until the task behind `handle` has completed
    fn finish(&self, handle: TaskHandle);

    /// Block until every outstanding task has completed
    fn finish_all(&self) {}
}

/// Runs everything on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTaskSystem;

impl TaskSystem for SerialTaskSystem {
    fn worker_count(&self) -> usize {
        1
    }

    fn enqueue(&self, _task: &dyn TaskCallback, _item_count: usize, _min_range: usize) -> Option<TaskHandle> {
        None
    }

    fn finish(&self, _handle: TaskHandle) {}
}

/// Task system backed by a rayon thread pool
#[cfg(feature = "parallel")]
pub struct RayonTaskSystem {
    pool: rayon::ThreadPool,
    next_handle: std::sync::atomic::AtomicU64,
}

#[cfg(feature = "parallel")]
impl RayonTaskSystem {
    /// Build a pool with `threads` workers (0 lets rayon pick)
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("planar-worker-{i}"))
            .build()?;
        log::debug!("Created rayon task system with {} workers", pool.current_num_threads());
        Ok(Self {
            pool,
            next_handle: std::sync::atomic::AtomicU64::new(0),
        })
    }
}

#[cfg(feature = "parallel")]
impl TaskSystem for RayonTaskSystem {
    fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn enqueue(&self, task: &dyn TaskCallback, item_count: usize, min_range: usize) -> Option<TaskHandle> {
        let workers = self.worker_count();
        let chunk = item_count.div_ceil(workers * 4).max(min_range).max(1);

        // The scope joins every range before returning, so the handle is already complete
        self.pool.scope(|s| {
            let mut start = 0;
            while start < item_count {
                let end = (start + chunk).min(item_count);
                s.spawn(move |_| {
                    let thread_index = rayon::current_thread_index().unwrap_or(0);
                    task.execute(start, end, thread_index);
                });
                start = end;
            }
        });

        let id = self.next_handle.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Some(TaskHandle(id))
    }

    fn finish(&self, _handle: TaskHandle) {}
}

/// Scratch state owned by one worker thread during a phase
#[derive(Debug, Default)]
pub(crate) struct WorkerContext {
    /// Contact slots whose touching state changed
    pub contact_state: BitSet,
    /// Contact slots whose shapes no longer overlap in the broad phase
    pub contact_disjoint: BitSet,
}

/// Dispatches phases to the host and owns the per-worker contexts
pub(crate) struct TaskBridge {
    system: Arc<dyn TaskSystem>,
    contexts: Vec<CachePadded<Mutex<WorkerContext>>>,
    tasks_enqueued: AtomicUsize,
}

impl TaskBridge {
    pub fn new(system: Arc<dyn TaskSystem>) -> Self {
        let workers = system.worker_count().max(1);
        Self {
            system,
            contexts: (0..workers).map(|_| CachePadded::new(Mutex::new(WorkerContext::default()))).collect(),
            tasks_enqueued: AtomicUsize::new(0),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn tasks_enqueued(&self) -> usize {
        self.tasks_enqueued.load(Ordering::Relaxed)
    }

    /// Run `task` over `0..item_count` and wait for it
    pub fn parallel_for(&self, item_count: usize, min_range: usize, task: &dyn TaskCallback) {
        if item_count == 0 {
            return;
        }
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
        match self.system.enqueue(task, item_count, min_range.max(1)) {
            Some(handle) => self.system.finish(handle),
            None => task.execute(0, item_count, 0),
        }
    }

    /// Barrier at the end of a step
    pub fn finish_all(&self) {
        self.system.finish_all();
    }

    /// Clear every worker's bitsets and size them for `len` contact slots
    pub fn reset_contexts(&mut self, len: usize) {
        for ctx in &mut self.contexts {
            let ctx = ctx.get_mut();
            ctx.contact_state.reset(len);
            ctx.contact_disjoint.reset(len);
        }
    }

    /// Context for a worker; out-of-range indices fold into range
    pub fn context(&self, thread_index: usize) -> MutexGuard<'_, WorkerContext> {
        self.contexts[thread_index % self.contexts.len()].lock()
    }

    /// Union of every worker's bitsets, in worker order
    pub fn merge_contexts(&mut self, len: usize) -> (BitSet, BitSet) {
        let mut state = BitSet::new(len);
        let mut disjoint = BitSet::new(len);
        for ctx in &mut self.contexts {
            let ctx = ctx.get_mut();
            state.union_with(&ctx.contact_state);
            disjoint.union_with(&ctx.contact_disjoint);
        }
        (state, disjoint)
    }
}

impl core::fmt::Debug for TaskBridge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskBridge")
            .field("workers", &self.contexts.len())
            .field("tasks_enqueued", &self.tasks_enqueued())
            .finish()
    }
}
