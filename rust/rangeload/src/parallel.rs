//! Per-job worker pool and cooperative cancellation.
//!
//! Every stage of an import is a data-parallel map over independent tasks
//! followed by a barrier. [`WorkerPool::try_map`] runs such a stage: it fans the
//! tasks out over the job's thread pool, cancels the remaining tasks once one
//! fails, and reduces the per-task results at the barrier.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::warn;
use rangeload_common::{Result, error::Error, error::ErrorKind};
use rayon::prelude::*;

/// Shared cancellation flag, polled by long-running tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        Default::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `Err(Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}

/// Thread pool of one import job.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    max_degree: usize,
}

impl WorkerPool {
    /// Creates a pool with `parallelism` threads (all cores when `None`).
    /// A degree of 1 runs every stage on the calling thread.
    pub fn new(parallelism: Option<usize>) -> Result<WorkerPool> {
        let max_degree = parallelism
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1);
        if max_degree == 1 {
            return Ok(WorkerPool {
                pool: None,
                max_degree,
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_degree)
            .thread_name(|i| format!("rangeload-worker-{i}"))
            .build()
            .map_err(|e| Error::invalid_operation(format!("create worker pool: {e}")))?;
        Ok(WorkerPool {
            pool: Some(pool),
            max_degree,
        })
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Applies `f` to every item, in parallel when the pool allows it.
    /// Results are returned in item order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        match &self.pool {
            Some(pool) if items.len() > 1 => {
                pool.install(|| items.into_par_iter().map(f).collect())
            }
            _ => items.into_iter().map(f).collect(),
        }
    }

    /// Runs a fallible stage.
    ///
    /// The first failing task cancels `cancel`, so that its siblings stop at
    /// their next check. All results are collected before returning; the
    /// reported error is the first one in item order that is not a
    /// cancellation, and the remaining errors are logged.
    pub fn try_map<T, R, F>(
        &self,
        stage: &str,
        items: Vec<T>,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Send + Sync,
    {
        let results = self.map(items, |item| {
            cancel.check()?;
            let res = f(item);
            if res.is_err() {
                cancel.cancel();
            }
            res
        });
        reduce_results(stage, results)
    }
}

/// Collapses per-task results at a stage barrier.
pub fn reduce_results<R>(stage: &str, results: Vec<Result<R>>) -> Result<Vec<R>> {
    let mut values = Vec::with_capacity(results.len());
    let mut first: Option<Error> = None;
    let mut suppressed = 0usize;
    for res in results {
        match res {
            Ok(value) => values.push(value),
            Err(e) => {
                let replace = match &first {
                    None => true,
                    Some(current) => {
                        matches!(current.kind(), ErrorKind::Cancelled)
                            && !matches!(e.kind(), ErrorKind::Cancelled)
                    }
                };
                if replace {
                    if let Some(prev) = first.replace(e) {
                        suppressed += log_suppressed(stage, &prev);
                    }
                } else {
                    suppressed += log_suppressed(stage, &e);
                }
            }
        }
    }
    match first {
        Some(e) => {
            if suppressed > 0 {
                warn!("{stage}: {suppressed} additional task failure(s)");
            }
            Err(e)
        }
        None => Ok(values),
    }
}

fn log_suppressed(stage: &str, e: &Error) -> usize {
    if matches!(e.kind(), ErrorKind::Cancelled) {
        0
    } else {
        warn!("{stage}: task failed: {e}");
        1
    }
}
