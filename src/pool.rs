//! Persistent worker pool driven by synchronized rounds.
//!
//! A [`WorkerPool`] owns a fixed set of scoped threads for the lifetime of
//! one engine invocation. Every worker is bound at creation to a disjoint,
//! contiguous index range (see [`partition`]) and never touches indices
//! outside it. The coordinating thread drives the pool one round at a time:
//!
//! ```text
//!  coordinator            worker 0 .. worker N-1
//!  ───────────            ──────────────────────
//!  round(param) ──wake──▶ task(range_i, &param)
//!               ◀─done─── partial result R_i
//!  Vec<R> (partition order)
//! ```
//!
//! Each worker has its own wake channel and its own completion channel, so a
//! round is a fan-out followed by a fan-in and round N+1 can never start
//! before every worker has posted round N. Teardown sets a stop flag, closes
//! the wake channels (the final wake) and joins every thread.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How many times teardown polls a worker before blocking on its join.
pub const JOIN_RETRIES: usize = 1_000;

/// Pause between two teardown polls.
pub const JOIN_BACKOFF: Duration = Duration::from_millis(1);

/// Worker pool failures
#[derive(Error, Debug)]
pub enum PoolError {
    /// The OS refused to start a worker thread
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker hung up its channels while a round was in flight
    #[error("worker {worker} stopped responding")]
    WorkerLost { worker: usize },

    /// A worker panicked; reported when it is joined
    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },
}

/// Split `[0, len)` into at most `cores` contiguous, balanced ranges.
///
/// At least one range is returned (empty when `len == 0`) and never more
/// ranges than indices, so no worker is started without work.
pub fn partition(len: usize, cores: usize) -> Vec<Range<usize>> {
    let workers = cores.max(1).min(len.max(1));
    let base = len / workers;
    let extra = len % workers;

    let mut start = 0;
    (0..workers)
        .map(|i| {
            let size = base + usize::from(i < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

struct Worker<'scope, P, R> {
    range: Range<usize>,
    wake: Option<Sender<Arc<P>>>,
    done: Receiver<R>,
    handle: Option<ScopedJoinHandle<'scope, ()>>,
}

/// Fixed-size pool of persistent workers executing one round at a time.
///
/// `P` is the round parameter published by the coordinator, `R` the partial
/// result every worker computes over its own range.
pub struct WorkerPool<'scope, P, R> {
    workers: Vec<Worker<'scope, P, R>>,
    stop: Arc<AtomicBool>,
    rounds: usize,
}

impl<'scope, P, R> WorkerPool<'scope, P, R>
where
    P: Send + Sync + 'scope,
    R: Send + 'scope,
{
    /// Start one worker per range of `partition(len, cores)`.
    ///
    /// The threads live inside `scope`, so `task` may borrow the dataset from
    /// the caller. They stay parked on their wake channel until the first
    /// call to [`round`](Self::round).
    pub fn spawn<'env, F>(
        scope: &'scope Scope<'scope, 'env>,
        cores: usize,
        len: usize,
        task: F,
    ) -> Result<Self, PoolError>
    where
        F: Fn(Range<usize>, &P) -> R + Send + Sync + 'scope,
    {
        let task = Arc::new(task);
        let stop = Arc::new(AtomicBool::new(false));
        let mut pool = Self {
            workers: Vec::new(),
            stop: Arc::clone(&stop),
            rounds: 0,
        };

        for (index, range) in partition(len, cores).into_iter().enumerate() {
            let (wake_tx, wake_rx) = mpsc::channel::<Arc<P>>();
            let (done_tx, done_rx) = mpsc::channel::<R>();
            let task = Arc::clone(&task);
            let stop = Arc::clone(&stop);
            let worker_range = range.clone();

            // On error the partially built pool is dropped, which tears down
            // the workers already running.
            let handle = thread::Builder::new()
                .name(format!("cluster-worker-{index}"))
                .spawn_scoped(scope, move || {
                    worker_loop(worker_range, &wake_rx, &done_tx, &stop, task.as_ref())
                })?;

            pool.workers.push(Worker {
                range,
                wake: Some(wake_tx),
                done: done_rx,
                handle: Some(handle),
            });
        }

        debug!(workers = pool.workers.len(), len, "worker pool started");
        Ok(pool)
    }

    /// Run exactly one barrier round.
    ///
    /// Publishes `param` to every worker, then blocks until each of them has
    /// posted its partial result. Results are returned in partition order.
    pub fn round(&mut self, param: P) -> Result<Vec<R>, PoolError> {
        let param = Arc::new(param);

        for (index, worker) in self.workers.iter().enumerate() {
            let wake = worker
                .wake
                .as_ref()
                .ok_or(PoolError::WorkerLost { worker: index })?;
            wake.send(Arc::clone(&param))
                .map_err(|_| PoolError::WorkerLost { worker: index })?;
        }

        let mut results = Vec::with_capacity(self.workers.len());
        for (index, worker) in self.workers.iter().enumerate() {
            let partial = worker
                .done
                .recv()
                .map_err(|_| PoolError::WorkerLost { worker: index })?;
            results.push(partial);
        }

        self.rounds += 1;
        Ok(results)
    }

    /// Index ranges owned by the workers, in partition order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.workers.iter().map(|w| w.range.clone())
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Rounds completed so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Stop every worker and wait for it to exit.
    pub fn shutdown(mut self) -> Result<(), PoolError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), PoolError> {
        self.stop.store(true, Ordering::SeqCst);

        // Closing the wake channel is the final wake: a worker parked in
        // recv() returns immediately and sees the stop flag.
        for worker in &mut self.workers {
            worker.wake.take();
        }

        let mut first_error = None;
        for (index, worker) in self.workers.iter_mut().enumerate() {
            let Some(handle) = worker.handle.take() else {
                continue;
            };

            let mut polls = 0;
            while !handle.is_finished() && polls < JOIN_RETRIES {
                thread::sleep(JOIN_BACKOFF);
                polls += 1;
            }
            if !handle.is_finished() {
                warn!(worker = index, polls, "worker still running after teardown polls");
            }

            if handle.join().is_err() {
                warn!(worker = index, "worker panicked");
                first_error.get_or_insert(PoolError::WorkerPanicked { worker: index });
            }
        }

        if !self.workers.is_empty() {
            debug!(workers = self.workers.len(), rounds = self.rounds, "worker pool stopped");
        }
        self.workers.clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<'scope, P, R> Drop for WorkerPool<'scope, P, R> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for worker in &mut self.workers {
            worker.wake.take();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop<P, R, F>(
    range: Range<usize>,
    wake: &Receiver<Arc<P>>,
    done: &Sender<R>,
    stop: &AtomicBool,
    task: &F,
) where
    F: Fn(Range<usize>, &P) -> R,
{
    while let Ok(param) = wake.recv() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let partial = task(range.clone(), &param);
        if done.send(partial).is_err() {
            break;
        }
    }
}

/// Merge an engine result with the outcome of pool teardown.
///
/// A teardown failure is logged; the engine result, success or error, is
/// returned as is.
pub(crate) fn settle<T, E>(result: Result<T, E>, teardown: Result<(), PoolError>) -> Result<T, E> {
    if let Err(e) = teardown {
        warn!(error = %e, "worker pool teardown reported a failure");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn assert_covers(ranges: &[Range<usize>], len: usize) {
        let mut next = 0;
        for r in ranges {
            assert_eq!(r.start, next, "gap or overlap at {}", next);
            assert!(r.end >= r.start);
            next = r.end;
        }
        assert_eq!(next, len);
    }

    #[test]
    fn test_partition_covers_every_index() {
        for len in [0usize, 1, 2, 7, 100, 1000, 1001] {
            for cores in 1..=16 {
                let ranges = partition(len, cores);
                assert!(!ranges.is_empty());
                assert!(ranges.len() <= cores);
                assert_covers(&ranges, len);
            }
        }
    }

    #[test]
    fn test_partition_is_balanced() {
        let ranges = partition(10, 4);
        let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_partition_more_cores_than_points() {
        let ranges = partition(3, 8);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_partition_zero_cores_uses_one_worker() {
        assert_eq!(partition(5, 0), vec![0..5]);
    }

    #[test]
    fn test_round_returns_results_in_partition_order() {
        let data: Vec<u64> = (0..100).collect();

        thread::scope(|scope| {
            let data = &data;
            let mut pool = WorkerPool::spawn(scope, 4, data.len(), move |range, offset: &u64| {
                data[range].iter().map(|v| v + offset).sum::<u64>()
            })
            .unwrap();

            let sums = pool.round(0).unwrap();
            assert_eq!(sums.len(), 4);
            assert_eq!(sums.iter().sum::<u64>(), (0..100).sum::<u64>());

            let shifted = pool.round(1).unwrap();
            assert_eq!(shifted.iter().sum::<u64>(), (0..100).sum::<u64>() + 100);

            let ranges: Vec<_> = pool.ranges().collect();
            assert_eq!(ranges[0], 0..25);
            assert_eq!(sums[0], (0..25).sum::<u64>());

            assert_eq!(pool.rounds(), 2);
            pool.shutdown().unwrap();
        });
    }

    #[test]
    fn test_workers_only_run_when_woken() {
        let executed = AtomicUsize::new(0);

        thread::scope(|scope| {
            let executed = &executed;
            let mut pool = WorkerPool::spawn(scope, 3, 30, move |range, _: &()| {
                executed.fetch_add(1, Ordering::SeqCst);
                range.len()
            })
            .unwrap();

            assert_eq!(executed.load(Ordering::SeqCst), 0);
            pool.round(()).unwrap();
            assert_eq!(executed.load(Ordering::SeqCst), 3);
            pool.round(()).unwrap();
            assert_eq!(executed.load(Ordering::SeqCst), 6);
            pool.shutdown().unwrap();
        });

        assert_eq!(executed.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_shutdown_releases_every_worker() {
        let probe = Arc::new(());

        thread::scope(|scope| {
            let held = Arc::clone(&probe);
            let mut pool = WorkerPool::spawn(scope, 4, 64, move |range, _: &()| {
                let _keep = &held;
                range.len()
            })
            .unwrap();

            pool.round(()).unwrap();
            pool.shutdown().unwrap();

            // Every worker dropped its handle on the task when it exited.
            assert_eq!(Arc::strong_count(&probe), 1);
        });
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        thread::scope(|scope| {
            let mut pool = WorkerPool::spawn(scope, 2, 10, |range: Range<usize>, _: &()| {
                if range.start == 0 {
                    panic!("boom");
                }
                range.len()
            })
            .unwrap();

            let err = pool.round(()).unwrap_err();
            assert!(matches!(err, PoolError::WorkerLost { worker: 0 }));

            let teardown = pool.shutdown().unwrap_err();
            assert!(matches!(teardown, PoolError::WorkerPanicked { worker: 0 }));
        });
    }

    #[test]
    fn test_drop_without_shutdown_joins_workers() {
        let probe = Arc::new(());

        thread::scope(|scope| {
            let held = Arc::clone(&probe);
            let pool = WorkerPool::spawn(scope, 2, 8, move |range, _: &()| {
                let _keep = &held;
                range.len()
            })
            .unwrap();
            drop(pool);
            assert_eq!(Arc::strong_count(&probe), 1);
        });
    }
}
