//! Intra-system entity fan-out
//!
//! A single system's tick often visits thousands of independent entities.
//! The executor partitions an entity slice across the rayon worker pool
//! (sized to available parallelism) and invokes the callback once per
//! entity with no ordering guarantee. Below the parallel threshold it runs
//! sequentially; thread overhead beats the win on small batches.
//!
//! The callback is expected, by convention, to touch only the component
//! kinds its system declared. The executor cannot verify that.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

/// Aggregate diagnostics for one executor
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Number of fan-out calls issued
    pub queries_issued: u64,
    /// Total entities visited across all calls
    pub entities_processed: u64,
    /// Cumulative wall time spent inside fan-out calls
    pub cumulative: Duration,
    /// Average wall time per fan-out call
    pub average: Duration,
}

/// Threshold-gated parallel executor for per-entity workloads
///
/// Safe to invoke repeatedly per tick and from multiple systems at once;
/// the counters are atomic and the executor holds no other state.
#[derive(Debug)]
pub struct EntityExecutor {
    /// Minimum batch size before fanning out to the worker pool
    parallel_threshold: usize,
    queries_issued: AtomicU64,
    entities_processed: AtomicU64,
    cumulative_ns: AtomicU64,
}

impl EntityExecutor {
    pub fn new(parallel_threshold: usize) -> Self {
        Self {
            parallel_threshold,
            queries_issued: AtomicU64::new(0),
            entities_processed: AtomicU64::new(0),
            cumulative_ns: AtomicU64::new(0),
        }
    }

    /// Invoke `f` once per entity, in parallel when the batch is large
    /// enough. No ordering guarantee between entities.
    pub fn for_each<T, F>(&self, entities: &[T], f: F)
    where
        T: Sync,
        F: Fn(&T) + Send + Sync,
    {
        let start = Instant::now();

        if entities.len() >= self.parallel_threshold {
            entities.par_iter().for_each(&f);
        } else {
            entities.iter().for_each(&f);
        }

        self.account(entities.len(), start.elapsed());
    }

    /// Mutating variant over disjoint entities. The borrow checker
    /// guarantees disjointness; parallelism comes from `par_iter_mut`.
    pub fn for_each_mut<T, F>(&self, entities: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Send + Sync,
    {
        let start = Instant::now();
        let len = entities.len();

        if len >= self.parallel_threshold {
            entities.par_iter_mut().for_each(&f);
        } else {
            entities.iter_mut().for_each(&f);
        }

        self.account(len, start.elapsed());
    }

    /// Indexed variant for systems that address parallel component columns
    /// by entity index.
    pub fn for_each_index<F>(&self, count: usize, f: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        let start = Instant::now();

        if count >= self.parallel_threshold {
            (0..count).into_par_iter().for_each(&f);
        } else {
            (0..count).for_each(&f);
        }

        self.account(count, start.elapsed());
    }

    fn account(&self, entities: usize, elapsed: Duration) {
        self.queries_issued.fetch_add(1, Ordering::Relaxed);
        self.entities_processed
            .fetch_add(entities as u64, Ordering::Relaxed);
        self.cumulative_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Point-in-time counter snapshot
    pub fn stats(&self) -> ExecutorStats {
        let queries = self.queries_issued.load(Ordering::Relaxed);
        let cumulative = Duration::from_nanos(self.cumulative_ns.load(Ordering::Relaxed));
        ExecutorStats {
            queries_issued: queries,
            entities_processed: self.entities_processed.load(Ordering::Relaxed),
            cumulative,
            average: if queries > 0 {
                cumulative / queries as u32
            } else {
                Duration::ZERO
            },
        }
    }

    pub fn reset_stats(&self) {
        self.queries_issued.store(0, Ordering::Relaxed);
        self.entities_processed.store(0, Ordering::Relaxed);
        self.cumulative_ns.store(0, Ordering::Relaxed);
    }
}

impl Default for EntityExecutor {
    fn default() -> Self {
        Self::new(crate::core::config::SchedulerConfig::default().parallel_threshold)
    }
}
