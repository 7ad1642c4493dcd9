/// Fixed-capacity worker pool
///
/// The pool only does bookkeeping on the coordinator side: it refuses work
/// beyond `capacity`, hands jobs to a `Spawn` implementation, and each job
/// reports back over a channel exactly once. The coordinator calls `release`
/// when it receives that report; workers never touch the counter.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use super::{RowId, Thumbnail};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where jobs actually run
pub trait Spawn: Send + Sync {
    fn spawn(&self, job: Job);
}

/// Runs jobs on a tokio runtime's blocking thread pool
#[derive(Debug, Clone)]
pub struct BlockingSpawner {
    handle: Handle,
}

impl BlockingSpawner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Spawn for BlockingSpawner {
    fn spawn(&self, job: Job) {
        // Completion is reported by the job itself
        drop(self.handle.spawn_blocking(job));
    }
}

/// A finished job
#[derive(Debug)]
pub struct Completion {
    pub row_id: RowId,
    pub image: Option<Thumbnail>,
}

pub struct WorkerPool {
    capacity: usize,
    in_flight: usize,
    spawner: Arc<dyn Spawn>,
    completions: UnboundedSender<Completion>,
}

impl WorkerPool {
    /// `capacity` is clamped to at least one worker
    pub fn new(
        capacity: usize,
        spawner: Arc<dyn Spawn>,
        completions: UnboundedSender<Completion>,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            in_flight: 0,
            spawner,
            completions,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn has_capacity(&self) -> bool {
        self.in_flight < self.capacity
    }

    /// Start `work` for `row_id` if a slot is free. Returns false (and drops
    /// `work` unstarted) when the pool is full.
    ///
    /// The job sends one `Completion` whatever happens, a panic in `work`
    /// included, so the slot is always given back.
    #[must_use]
    pub fn submit<F>(&mut self, row_id: RowId, work: F) -> bool
    where
        F: FnOnce() -> Option<Thumbnail> + Send + 'static,
    {
        if !self.has_capacity() {
            return false;
        }

        self.in_flight += 1;
        let completions = self.completions.clone();
        self.spawner.spawn(Box::new(move || {
            let image = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                warn!("Thumbnail job for row {} panicked", row_id.0);
                None
            });
            // The coordinator may already be gone at shutdown
            let _ = completions.send(Completion { row_id, image });
        }));
        true
    }

    /// Give back the slot of a completed job
    pub fn release(&mut self) {
        debug_assert!(self.in_flight > 0, "release without a job in flight");
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    /// Holds jobs until the test runs them, so ordering is deterministic
    #[derive(Default)]
    pub(crate) struct ManualSpawner {
        jobs: Mutex<VecDeque<Job>>,
    }

    impl ManualSpawner {
        pub(crate) fn queued(&self) -> usize {
            self.jobs.lock().len()
        }

        /// Run the oldest queued job; false if there was none
        pub(crate) fn run_next(&self) -> bool {
            let job = self.jobs.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    true
                }
                None => false,
            }
        }
    }

    impl Spawn for ManualSpawner {
        fn spawn(&self, job: Job) {
            self.jobs.lock().push_back(job);
        }
    }

    #[test]
    fn test_refuses_work_beyond_capacity() {
        let spawner = Arc::new(ManualSpawner::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::new(2, spawner.clone(), tx);

        assert!(pool.submit(RowId(1), || None));
        assert!(pool.submit(RowId(2), || None));
        assert!(!pool.submit(RowId(3), || None));
        assert_eq!(pool.in_flight(), 2);
        assert_eq!(spawner.queued(), 2);

        assert!(spawner.run_next());
        let done = rx.try_recv().unwrap();
        assert_eq!(done.row_id, RowId(1));
        pool.release();
        assert!(pool.has_capacity());
        assert!(pool.submit(RowId(3), || None));
    }

    #[test]
    fn test_panicking_job_still_completes() {
        let spawner = Arc::new(ManualSpawner::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::new(1, spawner.clone(), tx);

        assert!(pool.submit(RowId(7), || panic!("decoder blew up")));
        spawner.run_next();

        let done = rx.try_recv().unwrap();
        assert_eq!(done.row_id, RowId(7));
        assert!(done.image.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(0, Arc::new(ManualSpawner::default()), tx);
        assert_eq!(pool.capacity(), 1);
    }
}
