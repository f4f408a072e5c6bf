//! Tickstage - staged system scheduler for real-time simulation loops
//!
//! Registers independent units of per-tick logic ("systems"), decides from
//! their declared component access which of them may safely execute
//! concurrently, and drives them every frame inside a fixed time budget.
//! The world the systems operate on is opaque to the scheduler: it only
//! sequences access windows, it never inspects or locks the data.
//!
//! Two drivers are provided. [`scheduler::SequentialScheduler`] runs
//! systems one at a time in priority order; [`scheduler::ParallelScheduler`]
//! additionally plans conflict-free stages and runs each stage's members
//! concurrently with a barrier between stages. Inside a single system,
//! [`executor::EntityExecutor`] fans the per-entity workload out across the
//! same worker pool.

pub mod access;
pub mod conflict;
pub mod core;
pub mod executor;
pub mod metrics;
pub mod scheduler;

pub use crate::access::{AccessMeta, AccessRegistry};
pub use crate::conflict::{ConflictAnalyzer, ExecutionPlan, Stage};
pub use crate::core::config::SchedulerConfig;
pub use crate::core::error::{Result, SchedError};
pub use crate::core::types::{ComponentTag, Phase, SystemId, Tick};
pub use crate::executor::{EntityExecutor, ExecutorStats};
pub use crate::metrics::{MetricsSnapshot, PerfTracker};
pub use crate::scheduler::{
    FrameReport, ParallelScheduler, RenderSystem, SequentialScheduler, SystemFailure, TickSystem,
};
