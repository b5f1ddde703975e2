//! Worker pool for background thumbnail decoding.
//!
//! **Why**: Frame extraction blocks on I/O and codec work, so it never runs on
//! the control thread. Work-stealing deques keep fresh requests ahead of old
//! ones: new tasks land in the global injector, which workers drain before
//! stealing aged tasks from each other.
//!
//! **Used by**: ThumbnailLoader (decode tasks), demo binary
//!
//! The epoch mechanism cancels whole generations of requests at once, e.g.
//! when the feed reloads while decode tasks are still queued.

use crossbeam::deque::{Injector, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Work-stealing thread pool.
///
/// Sized by the caller; `num_cpus::get().saturating_sub(1).max(1)` keeps one
/// core free for the control thread.
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    // Shared with CacheBudget so a feed reload invalidates queued decodes
    current_epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    pub fn new(num_threads: usize, epoch: Arc<AtomicU64>) -> anyhow::Result<Self> {
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut locals: Vec<Worker<Job>> = Vec::new();
        let mut stealers = Vec::new();
        for _ in 0..num_threads {
            let worker: Worker<Job> = Worker::new_fifo();
            stealers.push(worker.stealer());
            locals.push(worker);
        }

        let mut handles = Vec::new();
        for (worker_id, worker) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("clipfeed-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    loop {
                        // Own queue first, then the injector, then steal
                        if let Some(job) = worker.pop() {
                            job();
                            continue;
                        }
                        if let Some(job) = injector.steal().success() {
                            job();
                            continue;
                        }
                        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
                            job();
                            continue;
                        }
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        thread::sleep(std::time::Duration::from_millis(1));
                    }
                    trace!("Worker {} stopped", worker_id);
                })?;
            handles.push(handle);
        }

        trace!("Workers initialized: {} threads", num_threads);
        Ok(Self {
            injector,
            handles,
            current_epoch: epoch,
            shutdown,
        })
    }

    /// Enqueue a job. Runs asynchronously on some worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Enqueue a job that silently skips itself when the epoch has moved on
    /// by the time a worker picks it up.
    pub fn execute_with_epoch<F>(&self, epoch: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let current = Arc::clone(&self.current_epoch);
        self.injector.push(Box::new(move || {
            if current.load(Ordering::Relaxed) == epoch {
                f();
            }
        }));
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        use std::time::{Duration, Instant};

        self.shutdown.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_millis(500);

        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Worker shutdown timeout, detaching remaining threads");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn wait_for(counter: &AtomicUsize, expected: usize) {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) < expected {
            assert!(std::time::Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_executes_all_jobs() {
        let workers = Workers::new(2, Arc::new(AtomicU64::new(0))).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let c = Arc::clone(&counter);
            workers.execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        wait_for(&counter, 20);
    }

    #[test]
    fn test_stale_epoch_jobs_are_skipped() {
        let epoch = Arc::new(AtomicU64::new(0));
        let workers = Workers::new(1, Arc::clone(&epoch)).unwrap();

        // Park the single worker so queued jobs cannot run yet
        let gate = Arc::new(AtomicBool::new(false));
        let g = Arc::clone(&gate);
        workers.execute(move || {
            while !g.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        });

        let stale = Arc::new(AtomicUsize::new(0));
        let fresh = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&stale);
        workers.execute_with_epoch(0, move || {
            s.fetch_add(1, Ordering::SeqCst);
        });

        epoch.fetch_add(1, Ordering::SeqCst);
        let f = Arc::clone(&fresh);
        workers.execute_with_epoch(1, move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        gate.store(true, Ordering::SeqCst);
        wait_for(&fresh, 1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(stale.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_joins_idle_workers() {
        let workers = Workers::new(3, Arc::new(AtomicU64::new(0))).unwrap();
        assert_eq!(workers.num_threads(), 3);
        drop(workers);
    }
}
