//! Elastic worker pool
//!
//! Workers are reusable execution slots. The pool starts with the
//! preallocated set, grows lazily up to the hard cap, and never blocks on
//! acquisition: a caller that finds the pool exhausted gets `None`
//! immediately and can record the overload instead of queueing unbounded
//! work.

use metrics::gauge;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A reusable execution slot, owned by the pool and lent to the dispatcher
/// for the duration of one iteration.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    iterations_run: u64,
}

impl Worker {
    fn new(id: usize) -> Self {
        Self {
            id,
            iterations_run: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Lifetime iteration count for this slot.
    pub fn iterations_run(&self) -> u64 {
        self.iterations_run
    }
}

/// Bounded pool of workers with non-blocking acquisition.
#[derive(Debug)]
pub struct WorkerPool {
    idle: Mutex<Vec<Worker>>,
    created: AtomicUsize,
    active: AtomicUsize,
    max_workers: usize,
}

impl WorkerPool {
    /// Create a pool holding `preallocated` idle workers, allowed to grow
    /// to `max_workers`. Bounds are validated by `ScenarioConfig`.
    pub fn new(preallocated: usize, max_workers: usize) -> Self {
        let idle = (0..preallocated).map(Worker::new).collect();
        Self {
            idle: Mutex::new(idle),
            created: AtomicUsize::new(preallocated),
            active: AtomicUsize::new(0),
            max_workers,
        }
    }

    /// Non-blocking acquisition: hand out an idle worker, lazily create one
    /// below the cap, or return `None` at the cap.
    pub fn acquire(&self) -> Option<Worker> {
        if let Some(worker) = self.idle.lock().unwrap().pop() {
            self.active.fetch_add(1, Ordering::SeqCst);
            return Some(worker);
        }

        let mut created = self.created.load(Ordering::SeqCst);
        loop {
            if created >= self.max_workers {
                return None;
            }
            match self.created.compare_exchange(
                created,
                created + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(id) => {
                    self.active.fetch_add(1, Ordering::SeqCst);
                    gauge!("surge_workers_created").set((id + 1) as f64);
                    return Some(Worker::new(id));
                }
                Err(actual) => created = actual,
            }
        }
    }

    /// Return a worker to the idle set.
    ///
    /// The slot rejoins the idle set before the active count drops, so a
    /// concurrent `acquire` can never observe an exhausted pool while a
    /// worker is actually available.
    pub fn release(&self, mut worker: Worker) {
        worker.iterations_run += 1;
        self.idle.lock().unwrap().push(worker);
        self.active.fetch_sub(1, Ordering::SeqCst);
        gauge!("surge_workers_active").set(self.active() as f64);
    }

    /// Workers currently lent out.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Workers created so far (idle + active).
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_preallocated_workers_are_idle() {
        let pool = WorkerPool::new(3, 5);
        assert_eq!(pool.created(), 3);
        assert_eq!(pool.active(), 0);

        let worker = pool.acquire().unwrap();
        assert_eq!(pool.active(), 1);
        pool.release(worker);
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.created(), 3);
    }

    #[test]
    fn test_lazy_growth_up_to_cap() {
        let pool = WorkerPool::new(1, 3);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_eq!(pool.created(), 3);
        assert_eq!(pool.active(), 3);

        // at the cap: unavailable, never blocking
        assert!(pool.acquire().is_none());

        pool.release(b);
        assert!(pool.acquire().is_some());
        drop((a, c));
    }

    #[test]
    fn test_workers_are_reused_not_recreated() {
        let pool = WorkerPool::new(1, 1);
        for _ in 0..10 {
            let worker = pool.acquire().unwrap();
            pool.release(worker);
        }
        assert_eq!(pool.created(), 1);

        let worker = pool.acquire().unwrap();
        assert_eq!(worker.iterations_run(), 10);
        pool.release(worker);
    }

    #[test]
    fn test_never_exceeds_max_under_contention() {
        let pool = Arc::new(WorkerPool::new(2, 16));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let peak = peak.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..2000 {
                    if let Some(worker) = pool.acquire() {
                        peak.fetch_max(pool.active(), Ordering::SeqCst);
                        pool.release(worker);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 16);
        assert!(pool.created() <= 16);
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn test_unavailable_only_when_all_workers_lent() {
        let pool = WorkerPool::new(0, 4);
        let workers: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.active(), 4);

        for worker in workers {
            pool.release(worker);
        }
        assert!(pool.acquire().is_some());
    }
}
