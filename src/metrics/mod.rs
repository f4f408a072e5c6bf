//! Per-system performance tracking
//!
//! Timing samples arrive from arbitrary worker threads while a stage is in
//! flight, so every counter is an atomic and the identity map takes its
//! write lock only when a system records its first sample. Snapshot reads
//! are weakly consistent with in-flight writers; this is a diagnostics
//! surface, not a ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ahash::AHashMap;
use serde::Serialize;

use crate::core::config::SchedulerConfig;
use crate::core::types::{SystemId, Tick};

/// Live counters for one system identity
///
/// Created lazily on the first sample, cleared only by an explicit reset.
#[derive(Debug, Default)]
pub struct SystemMetrics {
    update_count: AtomicU64,
    cumulative_ns: AtomicU64,
    last_ns: AtomicU64,
    max_ns: AtomicU64,
    /// Frame number of the last slow-system warning, for cooldown throttling
    last_warn_frame: AtomicU64,
}

impl SystemMetrics {
    fn record(&self, elapsed: Duration) {
        let ns = elapsed.as_nanos() as u64;
        self.update_count.fetch_add(1, Ordering::Relaxed);
        self.cumulative_ns.fetch_add(ns, Ordering::Relaxed);
        self.last_ns.store(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    /// True when a warning may fire this frame; updates the cooldown clock
    fn try_warn(&self, frame: Tick, cooldown_frames: u64) -> bool {
        let last = self.last_warn_frame.load(Ordering::Relaxed);
        // First-ever warning (last == 0 and never set) or cooldown expired.
        if last != 0 && frame.saturating_sub(last) < cooldown_frames {
            return false;
        }
        self.last_warn_frame
            .compare_exchange(last, frame.max(1), Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

/// Point-in-time copy of one system's counters
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub system: SystemId,
    pub update_count: u64,
    pub cumulative: Duration,
    pub last: Duration,
    pub max: Duration,
    pub average: Duration,
}

/// Collects per-system timing statistics and flags slow systems
///
/// Shareable across threads behind an `Arc`; `record` never blocks on
/// anything but the first-sample map insertion.
#[derive(Debug)]
pub struct PerfTracker {
    metrics: RwLock<AHashMap<SystemId, Arc<SystemMetrics>>>,
    slow_threshold: Duration,
    warn_cooldown_frames: u64,
}

impl PerfTracker {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            metrics: RwLock::new(AHashMap::new()),
            slow_threshold: config.slow_system_threshold(),
            warn_cooldown_frames: config.warn_cooldown_frames,
        }
    }

    fn entry(&self, id: SystemId) -> Arc<SystemMetrics> {
        // Fast path: identity already tracked
        if let Some(m) = self.metrics.read().expect("metrics lock poisoned").get(&id) {
            return Arc::clone(m);
        }
        let mut map = self.metrics.write().expect("metrics lock poisoned");
        Arc::clone(map.entry(id).or_default())
    }

    /// Record one timing sample for `id` during `frame`
    ///
    /// Emits a throttled `warn!` when the sample exceeds the slow-system
    /// threshold derived from the frame budget.
    pub fn record(&self, id: SystemId, elapsed: Duration, frame: Tick) {
        let metrics = self.entry(id);
        metrics.record(elapsed);

        if elapsed > self.slow_threshold && metrics.try_warn(frame, self.warn_cooldown_frames) {
            tracing::warn!(
                system = %id,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                threshold_ms = self.slow_threshold.as_secs_f64() * 1000.0,
                "slow system exceeded frame budget share"
            );
        }
    }

    /// Snapshot one identity, if it has ever been observed
    pub fn snapshot_for(&self, id: SystemId) -> Option<MetricsSnapshot> {
        let map = self.metrics.read().expect("metrics lock poisoned");
        map.get(&id).map(|m| snapshot_one(id, m))
    }

    /// Snapshot every tracked identity, heaviest cumulative time first
    ///
    /// Weakly consistent: counters read while writers are in flight may be
    /// mid-frame values.
    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        let map = self.metrics.read().expect("metrics lock poisoned");
        let mut all: Vec<MetricsSnapshot> = map
            .iter()
            .map(|(id, m)| snapshot_one(*id, m))
            .collect();
        all.sort_by(|a, b| b.cumulative.cmp(&a.cumulative).then(a.system.as_str().cmp(b.system.as_str())));
        all
    }

    /// Clear every tracked identity
    pub fn reset(&self) {
        self.metrics.write().expect("metrics lock poisoned").clear();
    }

    pub fn tracked_count(&self) -> usize {
        self.metrics.read().expect("metrics lock poisoned").len()
    }

    /// Dump a summary table through the log
    pub fn log_summary(&self) {
        let all = self.snapshot();
        if all.is_empty() {
            return;
        }
        tracing::info!("performance summary ({} systems)", all.len());
        for snap in all {
            tracing::info!(
                system = %snap.system,
                updates = snap.update_count,
                avg_ms = snap.average.as_secs_f64() * 1000.0,
                last_ms = snap.last.as_secs_f64() * 1000.0,
                max_ms = snap.max.as_secs_f64() * 1000.0,
                "  system timing"
            );
        }
    }
}

fn snapshot_one(id: SystemId, m: &SystemMetrics) -> MetricsSnapshot {
    let count = m.update_count.load(Ordering::Relaxed);
    let cumulative = Duration::from_nanos(m.cumulative_ns.load(Ordering::Relaxed));
    MetricsSnapshot {
        system: id,
        update_count: count,
        cumulative,
        last: Duration::from_nanos(m.last_ns.load(Ordering::Relaxed)),
        max: Duration::from_nanos(m.max_ns.load(Ordering::Relaxed)),
        average: if count > 0 {
            cumulative / count as u32
        } else {
            Duration::ZERO
        },
    }
}
