//! Load tracker
//!
//! Counts outstanding asynchronous work of a document and decides when the
//! load signal fires. Queued jobs run one at a time on a single drain
//! worker; deferred work done elsewhere (network fetches) is only counted.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use crate::operations::{DomError, DomResult};

/// Job function type
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Receives the two tracker transitions
pub trait LoadObserver: Send + Sync {
    /// The layout-blocking count dropped to zero
    fn layout_unblocked(&self);
    /// The registered count dropped to zero; fires once per load cycle
    fn load_complete(&self);
}

struct QueuedJob {
    run: Job,
    layout_blocking: bool,
}

/// State shared with the drain worker
struct Shared {
    registered: AtomicI64,
    blocking: AtomicI64,
    loaded: AtomicBool,
    stop: AtomicBool,
    queue: Mutex<Vec<QueuedJob>>,
    wake: Condvar,
    /// Opened by the worker once it has observed the stop flag
    gate: Mutex<bool>,
    gate_open: Condvar,
    observer: Weak<dyn LoadObserver>,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, Vec<QueuedJob>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, count: i64, layout_blocking: bool) {
        if layout_blocking {
            let previous = self.blocking.fetch_sub(count, Ordering::SeqCst);
            let now = previous - count;
            if now < 0 {
                invariant_violation(format!("layout-blocking job count went negative ({now})"));
            }
            if now == 0 && previous > 0 {
                tracing::debug!("Layout-blocking jobs drained");
                if let Some(observer) = self.observer.upgrade() {
                    observer.layout_unblocked();
                }
            }
        }

        let previous = self.registered.fetch_sub(count, Ordering::SeqCst);
        let now = previous - count;
        if now < 0 {
            invariant_violation(format!("registered job count went negative ({now})"));
        }
        if now == 0 && previous > 0 && !self.loaded.swap(true, Ordering::SeqCst) {
            tracing::info!("All registered jobs finished, firing load");
            if let Some(observer) = self.observer.upgrade() {
                observer.load_complete();
            }
        }
    }

    fn drain(&self) {
        loop {
            let batch = {
                let mut queue = self.lock_queue();
                while queue.is_empty() && !self.stop.load(Ordering::SeqCst) {
                    queue = self.wake.wait(queue).unwrap_or_else(PoisonError::into_inner);
                }
                if self.stop.load(Ordering::SeqCst) {
                    break;
                }
                std::mem::take(&mut *queue)
            };

            for job in batch {
                if self.stop.load(Ordering::SeqCst) {
                    break;
                }
                if panic::catch_unwind(AssertUnwindSafe(job.run)).is_err() {
                    tracing::error!("Queued job panicked");
                }
                self.finish(1, job.layout_blocking);
            }
        }

        tracing::debug!("Job worker observed stop");
        let mut open = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.gate_open.notify_all();
    }
}

fn invariant_violation(message: String) -> ! {
    let error = DomError::InvariantViolation(message);
    tracing::error!("{error}");
    panic!("{error}");
}

/// Per-document job counter, queue and drain worker
pub struct LoadTracker {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_name: String,
    stop_requested: AtomicBool,
}

impl LoadTracker {
    pub fn new(worker_name: impl Into<String>, observer: Weak<dyn LoadObserver>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registered: AtomicI64::new(0),
                blocking: AtomicI64::new(0),
                loaded: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                queue: Mutex::new(Vec::new()),
                wake: Condvar::new(),
                gate: Mutex::new(false),
                gate_open: Condvar::new(),
                observer,
            }),
            worker: Mutex::new(None),
            worker_name: worker_name.into(),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Outstanding jobs of any kind
    pub fn registered_jobs(&self) -> i64 {
        self.shared.registered.load(Ordering::SeqCst)
    }

    /// Outstanding jobs that hold layout back
    pub fn layout_blocking_jobs(&self) -> i64 {
        self.shared.blocking.load(Ordering::SeqCst)
    }

    /// Whether the load signal fired in the current cycle
    pub fn is_loaded(&self) -> bool {
        self.shared.loaded.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Start a new load cycle so the load signal can fire again
    pub fn rearm(&self) {
        self.shared.loaded.store(false, Ordering::SeqCst);
    }

    /// Count deferred work that completes outside the queue
    pub fn register_jobs(&self, count: i64, layout_blocking: bool) {
        self.shared.registered.fetch_add(count, Ordering::SeqCst);
        if layout_blocking {
            self.shared.blocking.fetch_add(count, Ordering::SeqCst);
        }
    }

    /// Report `count` finished jobs
    pub fn mark_jobs_finished(&self, count: i64, layout_blocking: bool) {
        self.shared.finish(count, layout_blocking);
    }

    /// Queue a job for the drain worker, starting it if needed. Jobs added
    /// after a stop are dropped without being counted.
    pub fn add_job(&self, job: impl FnOnce() + Send + 'static, layout_blocking: bool) -> DomResult<()> {
        if !self.ensure_worker()? {
            tracing::debug!("Job rejected, tracker stopped");
            return Ok(());
        }
        // The stop flag flips under the queue lock
        let mut queue = self.shared.lock_queue();
        if self.is_stopped() {
            tracing::debug!("Job rejected, tracker stopped");
            return Ok(());
        }
        self.register_jobs(1, layout_blocking);
        queue.push(QueuedJob { run: Box::new(job), layout_blocking });
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Start the worker unless it runs already. `false` once stopped.
    fn ensure_worker(&self) -> DomResult<bool> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        // `stop_everything` raises the flag before taking this lock
        if self.is_stopped() {
            return Ok(false);
        }
        if worker.is_some() {
            return Ok(true);
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.worker_name.clone())
            .spawn(move || shared.drain())
            .map_err(|e| DomError::WorkerUnavailable(e.to_string()))?;
        tracing::debug!(name = %self.worker_name, "Job worker started");
        *worker = Some(handle);
        Ok(true)
    }

    /// Stop the drain worker.
    ///
    /// Returns at once when the worker never started; otherwise blocks until
    /// the worker has observed the flag. Jobs still queued never run.
    ///
    /// # Panics
    ///
    /// A second call is a caller bug and panics.
    pub fn stop_everything(&self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            invariant_violation("stop_everything called twice".to_string());
        }
        {
            let _queue = self.shared.lock_queue();
            self.shared.stop.store(true, Ordering::SeqCst);
            self.shared.wake.notify_all();
        }

        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(handle) = handle else {
            return;
        };

        let mut open = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self.shared.gate_open.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
        drop(open);
        if handle.join().is_err() {
            tracing::error!("Job worker terminated abnormally");
        }
    }
}

impl Drop for LoadTracker {
    fn drop(&mut self) {
        // Tell the worker to exit without waiting on it; a job running on the
        // worker may be what dropped us.
        let _queue = self.shared.lock_queue();
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();
    }
}

impl std::fmt::Debug for LoadTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadTracker")
            .field("registered", &self.registered_jobs())
            .field("layout_blocking", &self.layout_blocking_jobs())
            .field("loaded", &self.is_loaded())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[derive(Default)]
    struct Counts {
        unblocked: AtomicUsize,
        loaded: AtomicUsize,
    }

    impl LoadObserver for Counts {
        fn layout_unblocked(&self) {
            self.unblocked.fetch_add(1, Ordering::SeqCst);
        }
        fn load_complete(&self) {
            self.loaded.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracker() -> (LoadTracker, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let observer: Weak<dyn LoadObserver> = Arc::downgrade(&counts) as Weak<dyn LoadObserver>;
        (LoadTracker::new("test-jobs", observer), counts)
    }

    #[test]
    fn test_counters_and_transitions() {
        let (tracker, counts) = tracker();
        tracker.register_jobs(2, true);
        tracker.register_jobs(1, false);
        assert_eq!(tracker.registered_jobs(), 3);
        assert_eq!(tracker.layout_blocking_jobs(), 2);

        tracker.mark_jobs_finished(2, true);
        assert_eq!(counts.unblocked.load(Ordering::SeqCst), 1);
        assert_eq!(counts.loaded.load(Ordering::SeqCst), 0);

        tracker.mark_jobs_finished(1, false);
        assert_eq!(counts.loaded.load(Ordering::SeqCst), 1);
        assert!(tracker.is_loaded());
    }

    #[test]
    fn test_load_latch_holds_until_rearmed() {
        let (tracker, counts) = tracker();
        tracker.register_jobs(1, false);
        tracker.mark_jobs_finished(1, false);
        tracker.register_jobs(1, false);
        tracker.mark_jobs_finished(1, false);
        assert_eq!(counts.loaded.load(Ordering::SeqCst), 1);

        tracker.rearm();
        tracker.register_jobs(1, false);
        tracker.mark_jobs_finished(1, false);
        assert_eq!(counts.loaded.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "went negative")]
    fn test_negative_count_is_fatal() {
        let (tracker, _counts) = tracker();
        tracker.mark_jobs_finished(1, false);
    }

    #[test]
    fn test_jobs_run_in_order() {
        let (tracker, counts) = tracker();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            tracker.add_job(move || tx.send(i).unwrap(), false).unwrap();
        }
        let seen: Vec<i32> = (0..5).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        tracker.stop_everything();
        assert_eq!(tracker.registered_jobs(), 0);
        assert_eq!(counts.loaded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_without_worker_returns() {
        let (tracker, _counts) = tracker();
        tracker.stop_everything();
        assert!(tracker.is_stopped());
    }

    #[test]
    fn test_job_after_stop_is_dropped() {
        let (tracker, counts) = tracker();
        tracker.stop_everything();
        tracker.add_job(|| panic!("must not run"), true).unwrap();
        assert!(tracker.worker.lock().unwrap().is_none());
        assert_eq!(tracker.registered_jobs(), 0);
        assert_eq!(tracker.layout_blocking_jobs(), 0);
        assert_eq!(counts.loaded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_racing_add_job_leaves_no_stray_work() {
        for _ in 0..50 {
            let (tracker, _counts) = tracker();
            let tracker = Arc::new(tracker);
            let adder = {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..20 {
                        tracker.add_job(|| {}, false).unwrap();
                    }
                })
            };
            tracker.stop_everything();
            adder.join().unwrap();
            // No worker outlives the stop and later jobs are not counted
            assert!(tracker.worker.lock().unwrap().is_none());
            let before = tracker.registered_jobs();
            tracker.add_job(|| {}, false).unwrap();
            assert_eq!(tracker.registered_jobs(), before);
        }
    }

    #[test]
    #[should_panic(expected = "called twice")]
    fn test_double_stop_is_fatal() {
        let (tracker, _counts) = tracker();
        tracker.stop_everything();
        tracker.stop_everything();
    }

    #[test]
    fn test_panicking_job_still_counts() {
        let (tracker, counts) = tracker();
        let (tx, rx) = mpsc::channel();
        tracker.add_job(|| panic!("job failure"), true).unwrap();
        tracker.add_job(move || tx.send(()).unwrap(), false).unwrap();
        rx.recv().unwrap();
        tracker.stop_everything();
        assert_eq!(tracker.layout_blocking_jobs(), 0);
        assert_eq!(counts.unblocked.load(Ordering::SeqCst), 1);
    }
}
